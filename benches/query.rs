use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use boxquery::{
    EntityId, FieldValue, MemoryBox, MemoryBoxConfig, OrderFlags, Property, PropertyId,
    PropertyType, QueryBuilder, Record,
};

const NAME: Property = Property::new(1, "name", PropertyType::String);
const AGE: Property = Property::new(2, "age", PropertyType::Long);

#[derive(Clone)]
struct Row {
    id: EntityId,
    name: String,
    age: i64,
}

impl Record for Row {
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
            _ => FieldValue::Null,
        }
    }
}

fn make_box(rows: i64) -> Arc<MemoryBox<Row>> {
    let memory = MemoryBox::new(MemoryBoxConfig::default()).unwrap();
    memory
        .put_many((0..rows).map(|i| Row {
            id: EntityId::default(),
            name: format!("user-{i:05}"),
            age: i % 90,
        }))
        .unwrap();
    Arc::new(memory)
}

fn bench_compile(c: &mut Criterion) {
    let memory = make_box(16);
    c.bench_function("query/compile_and_close", |b| {
        b.iter(|| {
            let q = QueryBuilder::new(Arc::clone(&memory))
                .unwrap()
                .filter(AGE.between(18, 65).and(NAME.starts_with("user-0")))
                .unwrap()
                .build()
                .unwrap();
            q.close().unwrap();
        });
    });
}

fn bench_execute(c: &mut Criterion) {
    let memory = make_box(4096);
    let mut group = c.benchmark_group("query/execute");
    group.throughput(Throughput::Elements(4096));

    let filtered = QueryBuilder::new(Arc::clone(&memory))
        .unwrap()
        .filter(AGE.greater(30).alias("min"))
        .unwrap()
        .build()
        .unwrap();
    group.bench_function("count", |b| b.iter(|| black_box(filtered.count().unwrap())));
    group.bench_function("sum", |b| b.iter(|| black_box(filtered.sum(&AGE).unwrap())));
    group.bench_function("rebind_and_count", |b| {
        let mut min = 0_i64;
        b.iter(|| {
            min = (min + 7) % 90;
            filtered.set_aliased_parameter(&AGE, "min", min).unwrap();
            black_box(filtered.count().unwrap())
        });
    });

    let ordered = QueryBuilder::new(Arc::clone(&memory))
        .unwrap()
        .filter(NAME.contains("7"))
        .unwrap()
        .order(&AGE, OrderFlags::DESCENDING)
        .unwrap()
        .build()
        .unwrap();
    group.bench_function("find_ordered", |b| b.iter(|| black_box(ordered.find().unwrap().len())));
    group.finish();

    filtered.close().unwrap();
    ordered.close().unwrap();
}

criterion_group!(benches, bench_compile, bench_execute);
criterion_main!(benches);
