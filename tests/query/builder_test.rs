use std::sync::Arc;

use serde_json::json;
use tributary::query::{
    reference_path, Cardinality, Operator, QueryBuilder, QueryError, QueryNode, RefOp, WhereClause,
};
use tributary::schema::{ColumnSchema, ReferenceError, Schema};
use tributary::ErrorKind;

fn rental_schema() -> Arc<Schema> {
    Arc::new(
        Schema::default()
            .with_table(
                "customer",
                [
                    ("customer_id", ColumnSchema::new("integer").primary_key()),
                    ("store_id", ColumnSchema::new("integer")),
                    ("first_name", ColumnSchema::new("text")),
                    ("password", ColumnSchema::new("text").hidden().not_whereable()),
                ],
            )
            .with_table(
                "store",
                [
                    ("store_id", ColumnSchema::new("integer").primary_key()),
                    ("address_id", ColumnSchema::new("integer").not_includable()),
                ],
            ),
    )
}

fn store() -> QueryNode {
    QueryBuilder::new("store")
        .filter("store_id", RefOp::unchecked("customer", "store_id"))
        .one()
        .unwrap()
}

fn customer_with_store() -> QueryNode {
    QueryBuilder::new("customer")
        .filter("customer_id", WhereClause::is_in([4]))
        .include("store", store())
        .one()
        .unwrap()
}

#[test]
fn test_customer_with_store_builds() {
    let query = customer_with_store();

    assert_eq!(query.from(), "customer");
    assert_eq!(query.cardinality(), Cardinality::One);
    assert_eq!(query.limit(), Some(1));
    assert_eq!(query.name(), "customer-customer_id");

    let store = &query.include()["store"];
    assert_eq!(
        store.filters()["store_id"].join_ref(),
        Some(&RefOp::unchecked("customer", "store_id"))
    );
}

#[test]
fn test_include_without_ref_is_rejected() {
    let unrelated = QueryBuilder::new("store")
        .filter("store_id", json!(1))
        .one()
        .unwrap();

    let err = QueryBuilder::new("customer")
        .include("store", unrelated)
        .one()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NestedQueryMissingJoinPredicate);
    let message = err.to_string();
    assert!(message.contains("'store'"));
    assert!(message.contains("'customer'"));
}

#[test]
fn test_ref_as_operator_operand_counts_as_join() {
    let inventory = QueryBuilder::new("inventory")
        .filter(
            "film_id",
            WhereClause::op(Operator::Ge, RefOp::unchecked("film", "film_id")),
        )
        .many()
        .unwrap();

    assert!(QueryBuilder::new("film")
        .include("inventory", inventory)
        .many()
        .is_ok());
}

#[test]
fn test_only_direct_includes_are_checked_by_the_parent() {
    // Each level validates its own includes when it is built
    let err = QueryBuilder::new("store")
        .filter("store_id", RefOp::unchecked("customer", "store_id"))
        .include("manager", QueryBuilder::new("staff").one().unwrap())
        .one()
        .unwrap_err();

    match err {
        QueryError::NestedQueryMissingJoinPredicate { key, parent, .. } => {
            assert_eq!(key, "manager");
            assert_eq!(parent.from(), "store");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_terminal_cardinality_and_limits() {
    let base = QueryBuilder::new("film");

    let many = base.many().unwrap();
    assert_eq!(many.cardinality(), Cardinality::Many);
    assert_eq!(many.limit(), None);

    let first = base.first().unwrap();
    assert_eq!(first.cardinality(), Cardinality::Maybe);
    assert_eq!(first.limit(), Some(1));

    let taken = base.take(25).unwrap();
    assert_eq!(taken.cardinality(), Cardinality::Many);
    assert_eq!(taken.limit(), Some(25));

    // A larger explicit limit survives `one`; zero is raised to one
    assert_eq!(base.limit(5).one().unwrap().limit(), Some(5));
    assert_eq!(base.limit(0).maybe().unwrap().limit(), Some(1));
}

#[test]
fn test_schema_defaults_fill_select_and_grouping_id() {
    let schema = rental_schema();
    let query = schema.from_table("customer").unwrap().many().unwrap();

    assert_eq!(
        query.select().iter().collect::<Vec<_>>(),
        vec!["customer_id", "first_name", "store_id"]
    );
    assert_eq!(query.grouping_id(), ["customer_id".to_string()]);
}

#[test]
fn test_empty_select_against_a_schema_means_selectable_columns() {
    let schema = rental_schema();
    let query = schema
        .from_table("customer")
        .unwrap()
        .select(Vec::<String>::new())
        .many()
        .unwrap();

    assert_eq!(
        query.select().iter().collect::<Vec<_>>(),
        vec!["customer_id", "first_name", "store_id"]
    );

    let locked = Arc::new(Schema::default().with_table(
        "secret",
        [("token", ColumnSchema::new("text").hidden())],
    ));
    let err = locked.from_table("secret").unwrap().many().unwrap_err();
    assert!(matches!(
        err,
        QueryError::Reference(ReferenceError::NothingSelectable(ref table)) if table == "secret"
    ));
}

#[test]
fn test_schema_rejects_unknown_and_hidden_columns() {
    let schema = rental_schema();

    assert!(matches!(
        schema.from_table("film"),
        Err(ReferenceError::UnknownTable(_))
    ));

    let err = schema
        .from_table("customer")
        .unwrap()
        .select(["password"])
        .many()
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Reference(ReferenceError::NotSelectable { .. })
    ));

    let err = schema
        .from_table("customer")
        .unwrap()
        .filter("password", json!("hunter2"))
        .many()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Reference);
}

#[test]
fn test_reference_path_checks_includable() {
    let schema = rental_schema();

    assert_eq!(
        reference_path(&schema, "customer.store_id").unwrap(),
        RefOp::unchecked("customer", "store_id")
    );
    assert!(matches!(
        reference_path(&schema, "store.address_id"),
        Err(ReferenceError::NotIncludable { .. })
    ));
    assert!(matches!(
        reference_path(&schema, "store"),
        Err(ReferenceError::InvalidPath(_))
    ));
}

#[test]
fn test_to_builder_round_trips_the_node() {
    let query = customer_with_store();
    let rebuilt = query.to_builder().one().unwrap();
    assert_eq!(rebuilt.hash(), query.hash());

    let widened = query.to_builder().limit(10).many().unwrap();
    assert_ne!(widened.hash(), query.hash());
    assert_eq!(widened.include().len(), 1);
}

#[test]
fn test_rebuilt_node_can_be_checked_again() {
    let schema = rental_schema();
    let query = schema.from_table("customer").unwrap().many().unwrap();

    // No schema travels with the node
    assert!(query.to_builder().select(["password"]).many().is_ok());

    let err = query
        .to_builder()
        .schema(Arc::clone(&schema))
        .select(["password"])
        .many()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Reference);
}

#[test]
fn test_also_include_merges_maps() {
    let rentals = Arc::new(
        QueryBuilder::new("rental")
            .filter("customer_id", RefOp::unchecked("customer", "customer_id"))
            .many()
            .unwrap(),
    );

    let query = customer_with_store()
        .to_builder()
        .also_include([("rentals", rentals)])
        .one()
        .unwrap();

    assert_eq!(
        query.include().keys().collect::<Vec<_>>(),
        vec!["rentals", "store"]
    );
}
