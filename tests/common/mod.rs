#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use boxquery::{
    EntityId, FieldValue, MemoryBox, MemoryBoxConfig, Property, PropertyId, PropertyType, Record,
    ThreadPoolConfig,
};

pub const NAME: Property = Property::new(1, "name", PropertyType::String);
pub const AGE: Property = Property::new(2, "age", PropertyType::Long);
pub const SCORE: Property = Property::new(3, "score", PropertyType::Double);
pub const ACTIVE: Property = Property::new(4, "active", PropertyType::Bool);
pub const BORN: Property = Property::new(5, "born", PropertyType::Date);

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: EntityId,
    pub name: String,
    pub age: Option<i64>,
    pub score: f64,
    pub active: bool,
    pub born: DateTime<Utc>,
}

impl Record for Person {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn value(&self, property: PropertyId) -> FieldValue {
        match property.0 {
            1 => self.name.as_str().into(),
            2 => self.age.into(),
            3 => self.score.into(),
            4 => self.active.into(),
            5 => self.born.into(),
            _ => FieldValue::Null,
        }
    }
}

pub fn born(year: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
}

pub fn person(name: &str, age: Option<i64>, score: f64, active: bool, year: i32) -> Person {
    Person {
        id: EntityId::default(),
        name: name.to_string(),
        age,
        score,
        active,
        born: born(year),
    }
}

/// Five people, ids 1..=5 in this order.
pub fn people() -> Arc<MemoryBox<Person>> {
    let config = MemoryBoxConfig {
        pool: ThreadPoolConfig {
            workers: 2,
            thread_name_prefix: "people-pool".to_string(),
        },
    };
    let people = MemoryBox::new(config).unwrap();
    people
        .put_many(vec![
            person("Alice", Some(31), 7.5, true, 1993),
            person("bob", Some(17), 4.0, false, 2007),
            person("Carol", Some(45), 9.0, true, 1979),
            person("dave", None, 5.5, true, 1990),
            person("Eve", Some(31), 6.0, false, 1993),
        ])
        .unwrap();
    Arc::new(people)
}

pub fn names(rows: &[Person]) -> Vec<&str> {
    rows.iter().map(|p| p.name.as_str()).collect()
}
