#[cfg(test)]
pub mod fixtures {
    use crate::{
        ir::DbType,
        metadata::{EntityInfo, MappingDict, Relationship},
    };

    pub fn northwind() -> MappingDict {
        MappingDict::new()
            .with(
                EntityInfo::new("Customer", "Customers")
                    .identity("ID", DbType::Int)
                    .mapped_column("Name", "CompanyName", DbType::String)
                    .column("City", DbType::String)
                    .nullable_column("Region", DbType::String)
                    .relationship(Relationship::many("Orders", "Order", &["ID"], &["CustomerID"]).cascading()),
            )
            .with(
                EntityInfo::new("Order", "Orders")
                    .key("ID", DbType::Int)
                    .column("CustomerID", DbType::Int)
                    .column("Total", DbType::Float)
                    .concurrency("Version", DbType::Int)
                    .relationship(Relationship::one("Customer", "Customer", &["CustomerID"], &["ID"])),
            )
    }
}

#[cfg(test)]
mod select_tests {
    use super::fixtures::northwind;
    use crate::{
        dialect::{SqliteSyntax, TSqlSyntax},
        ir::{Aggregator, DbType, Literal, PagingSpec, TableAlias},
        query::QueryExpr,
        translator::{TranslateError, TranslateOptions, Translator},
    };

    #[test]
    fn filter_becomes_where_with_parameter() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Customer").filter(|c| c.m("City").eq("London"));
        let r = Translator::new(&dict, &syntax).translate(&q).unwrap();

        assert!(r.sql.contains("FROM [Customers] AS t0"), "{}", r.sql);
        assert!(r.sql.contains("t0.[CompanyName] AS [Name]"), "{}", r.sql);
        assert!(r.sql.contains("WHERE t0.[City] = @p0"), "{}", r.sql);
        assert_eq!(r.parameters.len(), 1);
        assert_eq!(r.parameters[0].name, "p0");
        assert_eq!(r.parameters[0].db_type, DbType::String);
        assert_eq!(r.parameters[0].value, Literal::from("London"));
        assert_eq!(r.statements.len(), 1);
    }

    #[test]
    fn equal_values_share_a_parameter() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Customer").filter(|c| c.clone().m("City").eq("Lyon").or(c.m("Region").eq("Lyon")));
        let r = Translator::new(&dict, &syntax).translate(&q).unwrap();
        assert_eq!(r.parameters.len(), 1);
        assert_eq!(r.sql.matches("@p0").count(), 2, "{}", r.sql);
    }

    #[test]
    fn output_does_not_depend_on_alias_identity() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let query = || {
            QueryExpr::table("Order")
                .filter(|o| o.m("Total").gt(100))
                .order_by(|o| o.m("CustomerID"))
                .select(|o| QueryExpr::new_record([("id", o.clone().m("ID")), ("total", o.m("Total"))]))
        };
        let translator = Translator::new(&dict, &syntax);
        let first = translator.translate(&query()).unwrap();
        let shifted: Vec<TableAlias> = (0..7).map(|_| TableAlias::new()).collect();
        let second = translator.translate(&query()).unwrap();
        assert!(shifted.windows(2).all(|w| w[0] != w[1]));
        assert_eq!(first.sql, second.sql);
        assert_eq!(first.parameters, second.parameters);
        assert!(first.sql.contains("ORDER BY t0.[CustomerID]"), "{}", first.sql);
    }

    #[test]
    fn group_count_is_a_single_select() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Order")
            .group_by(|o| o.m("CustomerID"))
            .select(|g| QueryExpr::new_record([("customer", g.clone().key()), ("orders", g.count())]));
        let r = Translator::new(&dict, &syntax).translate(&q).unwrap();
        assert_eq!(r.sql.matches("SELECT").count(), 1, "{}", r.sql);
        assert!(r.sql.contains("COUNT(*)"), "{}", r.sql);
        assert!(r.sql.contains("GROUP BY t0.[CustomerID]"), "{}", r.sql);
    }

    #[test]
    fn group_sum_reads_the_grouped_table() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Order")
            .group_by(|o| o.m("CustomerID"))
            .select(|g| QueryExpr::new_record([("customer", g.clone().key()), ("spent", g.sum(|o| o.m("Total")))]));
        let r = Translator::new(&dict, &syntax).translate(&q).unwrap();
        assert_eq!(r.sql.matches("SELECT").count(), 1, "{}", r.sql);
        assert!(r.sql.contains("SUM(t0.[Total])"), "{}", r.sql);
        assert!(!r.sql.contains("t1."), "{}", r.sql);
    }

    #[test]
    fn group_max_filtered_becomes_having() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Order")
            .group_by(|o| o.m("CustomerID"))
            .select(|g| QueryExpr::new_record([("customer", g.clone().key()), ("largest", g.max(|o| o.m("Total")))]))
            .filter(|r| r.m("largest").gt(100));
        let r = Translator::new(&dict, &syntax).translate(&q).unwrap();
        assert!(r.sql.contains("MAX(t0.[Total])"), "{}", r.sql);
        assert!(r.sql.contains("HAVING MAX(t0.[Total]) > 100"), "{}", r.sql);
        assert!(!r.sql.contains("t1."), "{}", r.sql);
    }

    #[test]
    fn filtered_group_count_stays_correlated() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Order").group_by(|o| o.m("CustomerID")).select(|g| {
            QueryExpr::new_record([("customer", g.clone().key()), ("large", g.count_where(|o| o.m("Total").gt(100)))])
        });
        let r = Translator::new(&dict, &syntax).translate(&q).unwrap();
        assert_eq!(r.sql.matches("SELECT").count(), 2, "{}", r.sql);
        assert!(r.sql.contains("COUNT(*)"), "{}", r.sql);
        assert!(!r.sql.contains("AS []"), "{}", r.sql);
    }

    #[test]
    fn root_aggregates_have_no_column_alias() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let translator = Translator::new(&dict, &syntax);

        let count = translator.translate(&QueryExpr::table("Order").count()).unwrap();
        assert_eq!(count.sql, "SELECT COUNT(*)\nFROM [Orders] AS t0");
        assert_eq!(count.aggregator, Some(Aggregator::Scalar));

        let sum = translator.translate(&QueryExpr::table("Order").sum(|o| o.m("Total"))).unwrap();
        assert_eq!(sum.sql, "SELECT SUM(t0.[Total])\nFROM [Orders] AS t0");
    }

    #[test]
    fn to_one_member_in_selector_is_sent_to_the_server() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let translator = Translator::new(&dict, &syntax);

        let name = translator.translate(&QueryExpr::table("Order").select(|o| o.m("Customer").m("Name"))).unwrap();
        assert!(name.sql.contains("[CompanyName]"), "{}", name.sql);
        assert!(name.sql.contains("FROM [Customers]"), "{}", name.sql);
        assert!(name.nested.is_empty());

        let q = QueryExpr::table("Order")
            .select(|o| QueryExpr::new_record([("id", o.clone().m("ID")), ("city", o.m("Customer").m("City"))]));
        let record = translator.translate(&q).unwrap();
        assert!(record.sql.contains(".[ID]"), "{}", record.sql);
        assert!(record.sql.contains(".[City]"), "{}", record.sql);
    }

    #[test]
    fn distinct_grouped_ordered_page_keeps_every_clause() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Order")
            .group_by(|o| o.m("CustomerID"))
            .select(|g| g.key())
            .distinct()
            .order_by(|k| k)
            .skip(5)
            .take(10);
        let r = Translator::new(&dict, &syntax).translate(&q).unwrap();
        assert!(r.sql.contains("SELECT DISTINCT "), "{}", r.sql);
        assert!(r.sql.contains("GROUP BY "), "{}", r.sql);
        assert!(r.sql.contains("ORDER BY "), "{}", r.sql);
        assert!(r.sql.ends_with("OFFSET 5 ROWS FETCH NEXT 10 ROWS ONLY"), "{}", r.sql);
    }

    #[test]
    fn paging_per_dialect() {
        let dict = northwind();
        let q = QueryExpr::table("Customer").order_by(|c| c.m("City")).skip(10).take(5);

        let tsql = TSqlSyntax::new();
        let offset = Translator::new(&dict, &tsql).translate(&q).unwrap();
        assert!(offset.sql.ends_with("OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"), "{}", offset.sql);

        let legacy = TSqlSyntax::legacy();
        let numbered = Translator::new(&dict, &legacy).translate(&q).unwrap();
        assert!(numbered.sql.contains("ROW_NUMBER() OVER(ORDER BY"), "{}", numbered.sql);
        assert!(numbered.sql.contains("BETWEEN"), "{}", numbered.sql);
        assert!(!numbered.sql.contains("OFFSET"), "{}", numbered.sql);

        let limit = Translator::new(&dict, &SqliteSyntax).translate(&q).unwrap();
        assert!(limit.sql.ends_with("LIMIT 5 OFFSET 10"), "{}", limit.sql);
    }

    #[test]
    fn segment_is_returned_not_written() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Customer").order_by(|c| c.m("ID")).segment(2, 20);
        let r = Translator::new(&dict, &syntax).translate(&q).unwrap();
        assert_eq!(r.paging, Some(PagingSpec { page: 2, size: 20 }));
        assert!(!r.sql.contains("OFFSET"), "{}", r.sql);
    }

    #[test]
    fn inline_option_writes_literals() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Customer").filter(|c| c.m("Name").eq("O'Hara"));
        let r = Translator::new(&dict, &syntax).with_options(TranslateOptions::inline()).translate(&q).unwrap();
        assert!(r.parameters.is_empty());
        assert!(r.sql.contains("'O''Hara'"), "{}", r.sql);
    }

    #[test]
    fn where_only_emits_the_condition() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Order").filter(|o| o.m("Total").ge(10));
        let r = Translator::new(&dict, &syntax).with_options(TranslateOptions::where_clause()).translate(&q).unwrap();
        assert_eq!(r.sql, "[Total] >= 10");
    }

    #[test]
    fn errors_carry_the_query_text() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let err = Translator::new(&dict, &syntax).translate(&QueryExpr::table("Supplier")).unwrap_err();
        assert!(matches!(err.source, TranslateError::UnknownEntity(ref e) if e == "Supplier"));
        assert!(err.expression.contains("Supplier"));
    }

    #[test]
    fn nested_collection_is_a_correlated_statement() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let options = TranslateOptions { allow_client_joins: false, ..TranslateOptions::default() };
        let q = QueryExpr::table("Customer")
            .select(|c| QueryExpr::new_record([("name", c.clone().m("Name")), ("orders", c.m("Orders"))]));
        let r = Translator::new(&dict, &syntax).with_options(options).translate(&q).unwrap();

        assert_eq!(r.nested.len(), 1);
        let orders = &r.nested[0];
        assert_eq!(orders.member, "orders");
        assert!(orders.sql.contains("FROM [Orders] AS t0"), "{}", orders.sql);
        assert!(orders.sql.contains("@n0"), "{}", orders.sql);
        assert_eq!(orders.correlation.len(), 1);
        assert_eq!(orders.parameters[0].name, "n0");
    }

    #[test]
    fn result_serializes_to_json() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Customer").filter(|c| c.m("City").eq("Oslo")).first();
        let r = Translator::new(&dict, &syntax).translate(&q).unwrap();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["parameters"][0]["name"], "p0");
        assert_eq!(json["parameters"][0]["db_type"], "String");
        assert_eq!(json["aggregator"], "First");
        assert!(json["paging"].is_null());
    }
}

#[cfg(test)]
mod command_tests {
    use super::fixtures::northwind;
    use crate::{
        dialect::{SqliteSyntax, TSqlSyntax},
        ir::{Aggregator, Literal},
        query::{EntityRow, QueryExpr},
        translator::{TranslateError, Translator},
    };

    #[test]
    fn insert_with_identity_selects_generated_key() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let row = EntityRow::new("Customer").set("Name", "Acme").set("City", "Oslo");
        let r = Translator::new(&dict, &syntax).translate(&QueryExpr::table("Customer").insert(row)).unwrap();

        assert_eq!(r.statements.len(), 2);
        assert_eq!(r.statements[0], "INSERT INTO [Customers]([CompanyName], [City])\nVALUES (@p0, @p1)");
        assert_eq!(r.statements[1], "SELECT SCOPE_IDENTITY() AS [ID]");
        assert_eq!(r.aggregator, Some(Aggregator::Single));
        assert_eq!(r.parameters.len(), 2);
    }

    #[test]
    fn delete_where_qualifies_by_table() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let q = QueryExpr::table("Order").delete_where(|o| o.m("Total").lt(0));
        let r = Translator::new(&dict, &syntax).translate(&q).unwrap();
        assert_eq!(r.sql, "DELETE FROM [Orders]\nWHERE [Orders].[Total] < 0");
    }

    #[test]
    fn update_checks_key_and_original_version() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let row = EntityRow::new("Order").set("ID", 7).set("Total", 12.5).set("Version", 3).original("Version", 2);
        let r = Translator::new(&dict, &syntax).translate(&QueryExpr::table("Order").update(row)).unwrap();
        assert!(r.sql.starts_with("UPDATE [Orders]\nSET "), "{}", r.sql);
        assert!(r.sql.contains("[Orders].[ID] = @p"), "{}", r.sql);
        assert!(r.sql.contains("[Orders].[Version] = @p"), "{}", r.sql);
        let values: Vec<&Literal> = r.parameters.iter().map(|p| &p.value).collect();
        assert!(values.contains(&&Literal::Int(7)));
        assert!(values.contains(&&Literal::Int(2)));
    }

    #[test]
    fn cascading_delete_removes_children_first() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let row = EntityRow::new("Customer").set("ID", 4);
        let r = Translator::new(&dict, &syntax).translate(&QueryExpr::table("Customer").delete(row)).unwrap();
        assert_eq!(r.statements.len(), 2);
        assert!(r.statements[0].starts_with("DELETE FROM [Orders]"), "{}", r.statements[0]);
        assert!(r.statements[0].contains("EXISTS("), "{}", r.statements[0]);
        assert!(r.statements[1].starts_with("DELETE FROM [Customers]"), "{}", r.statements[1]);
    }

    #[test]
    fn cascading_insert_reads_the_generated_parent_key() {
        let dict = northwind();
        let syntax = TSqlSyntax::new();
        let row = EntityRow::new("Customer")
            .set("Name", "Acme")
            .child("Orders", EntityRow::new("Order").set("ID", 1).set("Total", 5.0))
            .child("Orders", EntityRow::new("Order").set("ID", 2).set("Total", 7.5));
        let r = Translator::new(&dict, &syntax).translate(&QueryExpr::table("Customer").insert(row)).unwrap();

        assert_eq!(r.statements.len(), 4);
        assert_eq!(r.statements[1], "SELECT SCOPE_IDENTITY() AS [ID]");
        for child in &r.statements[2..] {
            assert!(child.starts_with("INSERT INTO [Orders]("), "{}", child);
            assert!(child.contains("[CustomerID]"), "{}", child);
            assert!(child.contains("SCOPE_IDENTITY()"), "{}", child);
        }
    }

    #[test]
    fn rowid_dialect_reads_the_parent_key_once() {
        let dict = northwind();
        let one = EntityRow::new("Customer").set("Name", "Acme").child("Orders", EntityRow::new("Order").set("Total", 5.0));
        let r = Translator::new(&dict, &SqliteSyntax).translate(&QueryExpr::table("Customer").insert(one)).unwrap();
        assert!(r.statements[2].contains("last_insert_rowid()"), "{}", r.statements[2]);

        let two = EntityRow::new("Customer")
            .set("Name", "Acme")
            .child("Orders", EntityRow::new("Order").set("Total", 5.0))
            .child("Orders", EntityRow::new("Order").set("Total", 7.5));
        let err = Translator::new(&dict, &SqliteSyntax).translate(&QueryExpr::table("Customer").insert(two)).unwrap_err();
        assert!(matches!(err.source, TranslateError::InvalidOperation(_)));
    }
}
