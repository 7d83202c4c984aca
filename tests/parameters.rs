mod common;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use boxquery::{EngineError, MemoryBox, Query, QueryBuilder, QueryCondition, QueryError};

use common::{born, names, people, Person, ACTIVE, AGE, BORN, NAME, SCORE};

fn query(people: &Arc<MemoryBox<Person>>, condition: impl Into<QueryCondition>) -> Query<MemoryBox<Person>> {
    QueryBuilder::new(Arc::clone(people))
        .unwrap()
        .filter(condition)
        .unwrap()
        .build()
        .unwrap()
}

#[test]
fn rebinding_by_alias_changes_only_that_operand() {
    let people = people();
    let q = query(
        &people,
        AGE.greater(20).alias("min").and(AGE.less(40).alias("max")),
    );
    assert_eq!(names(&q.find().unwrap()), vec!["Alice", "Eve"]);

    q.set_aliased_parameter(&AGE, "max", 50).unwrap();
    assert_eq!(names(&q.find().unwrap()), vec!["Alice", "Carol", "Eve"]);

    q.set_aliased_parameter(&AGE, "min", 40).unwrap();
    assert_eq!(names(&q.find().unwrap()), vec!["Carol"]);
    assert_eq!(
        q.describe_parameters().unwrap(),
        "age#2 (alias min) = 40\nage#2 (alias max) = 50"
    );
    assert_eq!(people.engine_stats().live_plans, 1);
    q.close().unwrap();
}

#[test]
fn ambiguous_or_unknown_parameters_are_engine_errors() {
    let people = people();
    let q = query(
        &people,
        AGE.greater(20).alias("min").and(AGE.less(40).alias("max")),
    );

    let err = q.set_parameter(&AGE, 30).unwrap_err();
    assert!(matches!(
        err,
        QueryError::Engine(EngineError::AmbiguousParameter { .. })
    ));

    let err = q.set_aliased_parameter(&AGE, "mid", 30).unwrap_err();
    assert!(matches!(
        err,
        QueryError::Engine(EngineError::ParameterNotFound { .. })
    ));

    let err = q.set_parameter(&NAME, "x").unwrap_err();
    assert!(matches!(
        err,
        QueryError::Engine(EngineError::ParameterNotFound { .. })
    ));

    let err = q.set_aliased_parameter(&AGE, "min", 1.5).unwrap_err();
    assert!(matches!(
        err,
        QueryError::Engine(EngineError::ParameterTypeMismatch { .. })
    ));
    q.close().unwrap();
}

#[test]
fn single_condition_rebinds_without_alias() {
    let people = people();
    let q = query(&people, NAME.equal("bob"));
    assert_eq!(names(&q.find().unwrap()), vec!["bob"]);

    q.set_parameter(&NAME, "CAROL").unwrap();
    assert_eq!(names(&q.find().unwrap()), vec!["Carol"]);

    // An empty alias addresses the property directly.
    q.set_aliased_parameter(&NAME, "", String::from("eve")).unwrap();
    assert_eq!(names(&q.find().unwrap()), vec!["Eve"]);
    q.close().unwrap();
}

#[test]
fn range_parameters() {
    let people = people();

    let ages = query(&people, AGE.between(0, 1));
    assert!(ages.find().unwrap().is_empty());
    ages.set_parameters(&AGE, 30, 40).unwrap();
    assert_eq!(names(&ages.find().unwrap()), vec!["Alice", "Eve"]);

    let scores = query(&people, SCORE.between(0.0, 1.0).alias("band"));
    scores
        .set_aliased_parameters(&SCORE, "band", 8.0, 10.0)
        .unwrap();
    assert_eq!(names(&scores.find().unwrap()), vec!["Carol"]);

    let err = scores.set_aliased_parameter(&SCORE, "band", 9.0).unwrap_err();
    assert!(err.is_engine());

    ages.close().unwrap();
    scores.close().unwrap();
}

#[test]
fn bool_parameter_matches_integer_form() {
    let people = people();
    let q = query(&people, ACTIVE.equal(true));

    q.set_parameter(&ACTIVE, false).unwrap();
    let by_bool = names(&q.find().unwrap()).join(",");

    q.set_parameter(&ACTIVE, 0_i64).unwrap();
    let by_int = names(&q.find().unwrap()).join(",");

    assert_eq!(by_bool, "bob,Eve");
    assert_eq!(by_bool, by_int);
    q.close().unwrap();
}

#[test]
fn date_parameters_bind_epoch_millis() {
    let people = people();
    let q = query(&people, BORN.greater(born(2000)));
    assert_eq!(names(&q.find().unwrap()), vec!["bob"]);

    q.set_parameter(&BORN, born(1985)).unwrap();
    assert_eq!(names(&q.find().unwrap()), vec!["Alice", "bob", "dave", "Eve"]);

    q.set_parameter(&BORN, born(1985).timestamp_millis()).unwrap();
    assert_eq!(q.count().unwrap(), 4);

    let calls = people.engine_stats().native_calls;
    let err = q.set_parameter(&BORN, None::<DateTime<Utc>>).unwrap_err();
    assert!(err.is_validation());
    assert_eq!(people.engine_stats().native_calls, calls);

    let window = query(&people, BORN.between(born(1900), born(1901)));
    window
        .set_parameters(&BORN, born(1979), born(1990))
        .unwrap();
    assert_eq!(names(&window.find().unwrap()), vec!["Carol", "dave"]);

    q.close().unwrap();
    window.close().unwrap();
}

#[test]
fn parameters_chain_and_fail_after_close() {
    let people = people();
    let q = query(
        &people,
        AGE.greater(0).alias("min").and(SCORE.less(100.0)),
    );
    q.set_aliased_parameter(&AGE, "min", 30)
        .unwrap()
        .set_parameter(&SCORE, 7.0)
        .unwrap();
    assert_eq!(names(&q.find().unwrap()), vec!["Eve"]);

    q.close().unwrap();
    assert!(q.set_parameter(&SCORE, 1.0).unwrap_err().is_closed());
}
