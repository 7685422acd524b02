use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    ir::DbType,
    translator::{TranslateError, TranslateResult},
};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\d+)\}").unwrap());

/// A user-defined function rendered from a template such as
/// `DIFFERENCE({0}, {1})`.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFunction {
    pub name: String,
    pub template: String,
    pub db_type: DbType,
    arity: usize,
}

impl CustomFunction {
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn render(&self, args: &[String]) -> TranslateResult<String> {
        if args.len() != self.arity {
            return Err(TranslateError::invalid(format!(
                "function '{}' expects {} argument(s), got {}",
                self.name,
                self.arity,
                args.len()
            )));
        }
        Ok(PLACEHOLDER
            .replace_all(&self.template, |caps: &regex::Captures| {
                caps[1].parse::<usize>().ok().and_then(|i| args.get(i)).cloned().unwrap_or_default()
            })
            .into_owned())
    }
}

/// Case-insensitive registry of custom functions.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    by_name: HashMap<String, CustomFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arity is one past the highest placeholder index in the template.
    pub fn register(&mut self, name: &str, template: &str, db_type: DbType) {
        let arity = PLACEHOLDER
            .captures_iter(template)
            .filter_map(|c| c[1].parse::<usize>().ok())
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);
        let f = CustomFunction { name: name.to_string(), template: template.to_string(), db_type, arity };
        self.by_name.insert(name.to_ascii_lowercase(), f);
    }

    pub fn with(mut self, name: &str, template: &str, db_type: DbType) -> Self {
        self.register(name, template, db_type);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CustomFunction> {
        self.by_name.get(&name.to_ascii_lowercase())
    }

    pub fn list(&self) -> Vec<String> {
        let mut v: Vec<_> = self.by_name.keys().cloned().collect();
        v.sort();
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_arity_and_render() {
        let r = FunctionRegistry::new()
            .with("Soundex", "SOUNDEX({0})", DbType::String)
            .with("diff", "DIFFERENCE({0}, {1})", DbType::Int);
        assert_eq!(r.list(), vec!["diff", "soundex"]);
        let f = r.get("SOUNDEX").unwrap();
        assert_eq!(f.arity(), 1);
        assert_eq!(f.render(&["t0.[Name]".into()]).unwrap(), "SOUNDEX(t0.[Name])");
        let d = r.get("diff").unwrap();
        assert_eq!(d.render(&["a".into(), "b".into()]).unwrap(), "DIFFERENCE(a, b)");
        assert!(matches!(d.render(&["a".into()]), Err(TranslateError::InvalidOperation(_))));
    }
}
