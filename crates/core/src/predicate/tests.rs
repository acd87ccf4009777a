use super::*;

#[test]
fn predicates_join_with_and_by_default() {
    let clause = PredicateList::new()
        .with(Predicate::like("title", "%ye%"))
        .with(Predicate::greater_than("position", 3))
        .to_where()
        .unwrap();
    assert_eq!(
        clause.fragment(),
        "title LIKE :title_like AND position > :position_gt"
    );
    assert_eq!(
        clause.values().cloned().collect::<Vec<_>>(),
        vec![Value::from("%ye%"), Value::Integer(3)]
    );
}

#[test]
fn any_joins_with_or() {
    let clause = PredicateList::any([
        Predicate::equals("title", "a"),
        Predicate::equals("title", "b"),
    ])
    .to_where()
    .unwrap();
    assert_eq!(clause.fragment(), "title = :title_eq OR title = :title_eq_2");
}

#[test]
fn repeated_column_operator_pairs_get_distinct_placeholders() {
    let clause = PredicateList::all([
        Predicate::greater_or_equal("position", 1),
        Predicate::less_or_equal("position", 9),
        Predicate::greater_or_equal("position", 2),
    ])
    .to_where()
    .unwrap();
    let names = clause
        .params()
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec![":position_ge", ":position_le", ":position_ge_2"]);
}

#[test]
fn between_binds_two_values_in_order() {
    let clause = PredicateList::from(Predicate::between("position", 2, 5))
        .to_where()
        .unwrap();
    assert_eq!(
        clause.fragment(),
        "position BETWEEN :position_between_lo AND :position_between_hi"
    );
    assert_eq!(
        clause.params(),
        &[
            (":position_between_lo".to_string(), Value::Integer(2)),
            (":position_between_hi".to_string(), Value::Integer(5)),
        ]
    );
}

#[test]
fn null_equality_renders_is_null() {
    let clause = PredicateList::all([
        Predicate::equals("PARENT_Note_ID", Value::Null),
        Predicate::not_equals("title", Value::Null),
    ])
    .to_where()
    .unwrap();
    assert_eq!(
        clause.fragment(),
        "PARENT_Note_ID IS NULL AND title IS NOT NULL"
    );
    assert!(clause.params().is_empty());

    assert_eq!(
        PredicateList::from(Predicate::less_than("position", Value::Null))
            .to_where()
            .unwrap_err(),
        PredicateError::NullOperand {
            column: "position".to_string()
        }
    );
}

#[test]
fn invalid_columns_are_rejected() {
    assert_eq!(
        PredicateList::from(Predicate::equals("title = 1 OR 1", "x"))
            .to_where()
            .unwrap_err(),
        PredicateError::InvalidColumn {
            name: "title = 1 OR 1".to_string()
        }
    );
}

#[test]
fn empty_list_renders_empty_fragment() {
    let clause = PredicateList::new().to_where().unwrap();
    assert!(clause.is_empty());
    assert!(clause.params().is_empty());
}
