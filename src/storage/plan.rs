//! Compiled plans of the in-memory engine.
//!
//! A plan is a list of operand slots, numbered in the order the conditions
//! were applied, and a predicate tree over those slots. Rebinding a parameter
//! overwrites one slot's operand in place.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use crate::condition::{Combinator, ConditionSink, Operation};
use crate::engine::{EngineError, EngineResult, NativeQueryBuilder, QueryHandle};
use crate::property::{OrderFlags, Property, PropertyId, PropertyType, StringOrder};

use super::memory::{FieldValue, Record};

fn lock_err(context: &'static str) -> EngineError {
    EngineError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    None,
    Int(i64),
    IntRange(i64, i64),
    Float(f64),
    FloatRange(f64, f64),
    Ints(Vec<i64>),
    Text(String, StringOrder),
    Texts(Vec<String>, StringOrder),
    Bytes(Vec<u8>),
}

impl Operand {
    const fn kind(&self) -> &'static str {
        match self {
            Self::None => "nothing",
            Self::Int(_) => "int",
            Self::IntRange(..) => "int range",
            Self::Float(_) => "float",
            Self::FloatRange(..) => "float range",
            Self::Ints(_) => "int list",
            Self::Text(..) => "text",
            Self::Texts(..) => "text list",
            Self::Bytes(_) => "bytes",
        }
    }

    fn accepts(&self, property_type: PropertyType) -> bool {
        match self {
            Self::None => true,
            Self::Int(_) | Self::IntRange(..) | Self::Ints(_) => property_type.is_integer(),
            Self::Float(_) | Self::FloatRange(..) => property_type.is_floating(),
            Self::Text(..) | Self::Texts(..) => property_type == PropertyType::String,
            Self::Bytes(_) => property_type == PropertyType::Bytes,
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Int(v) => write!(f, "{v}"),
            Self::IntRange(low, high) => write!(f, "{low}..={high}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::FloatRange(low, high) => write!(f, "{low}..={high}"),
            Self::Ints(values) => write!(f, "{values:?}"),
            Self::Text(v, order) => write!(f, "{v:?}{}", case_suffix(*order)),
            Self::Texts(values, order) => write!(f, "{values:?}{}", case_suffix(*order)),
            Self::Bytes(v) => write!(f, "{v:?}"),
        }
    }
}

const fn case_suffix(order: StringOrder) -> &'static str {
    match order {
        StringOrder::CaseInsensitive => "",
        StringOrder::CaseSensitive => " (case sensitive)",
    }
}

fn fold(text: &str, case_sensitive: bool) -> Cow<'_, str> {
    if case_sensitive {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.to_ascii_lowercase())
    }
}

/// One operand slot: the unit parameters are rebound on.
#[derive(Debug, Clone)]
struct Slot {
    property: Property,
    alias: Option<String>,
    op: Operation,
    operand: Operand,
}

impl Slot {
    fn mismatch(&self, actual: &FieldValue) -> EngineError {
        EngineError::PropertyType {
            property: self.property.id(),
            operation: format!("{} with {} operand on {} value", self.op, self.operand.kind(), actual.kind()),
        }
    }

    fn corrupt(&self) -> EngineError {
        EngineError::CorruptPlan(format!(
            "{} cannot take a {} operand",
            self.op,
            self.operand.kind()
        ))
    }

    /// Applies a three-way comparison result to a comparison operation.
    fn compare(&self, ord: Option<Ordering>) -> EngineResult<bool> {
        let Some(ord) = ord else {
            return Ok(false);
        };
        match self.op {
            Operation::Equal => Ok(ord == Ordering::Equal),
            Operation::NotEqual => Ok(ord != Ordering::Equal),
            Operation::Greater => Ok(ord == Ordering::Greater),
            Operation::Less => Ok(ord == Ordering::Less),
            _ => Err(self.corrupt()),
        }
    }

    fn membership(&self, found: bool) -> EngineResult<bool> {
        match self.op {
            Operation::In => Ok(found),
            Operation::NotIn => Ok(!found),
            _ => Err(self.corrupt()),
        }
    }

    fn matches(&self, value: &FieldValue) -> EngineResult<bool> {
        match self.op {
            Operation::IsNull => return Ok(value.is_null()),
            Operation::NotNull => return Ok(!value.is_null()),
            _ => {}
        }
        if value.is_null() {
            return Ok(false);
        }

        match (&self.operand, value) {
            (Operand::Int(v), FieldValue::Int(x)) => self.compare(Some(x.cmp(v))),
            (Operand::IntRange(low, high), FieldValue::Int(x)) => Ok(low <= x && x <= high),
            (Operand::Float(v), FieldValue::Float(x)) => self.compare(x.partial_cmp(v)),
            (Operand::FloatRange(low, high), FieldValue::Float(x)) => Ok(*low <= *x && *x <= *high),
            (Operand::Ints(values), FieldValue::Int(x)) => self.membership(values.contains(x)),
            (Operand::Text(v, order), FieldValue::Text(x)) => {
                let sensitive = order.is_case_sensitive();
                let (x, v) = (fold(x, sensitive), fold(v, sensitive));
                match self.op {
                    Operation::Contains => Ok(x.contains(&*v)),
                    Operation::StartsWith => Ok(x.starts_with(&*v)),
                    Operation::EndsWith => Ok(x.ends_with(&*v)),
                    _ => self.compare(Some(x.cmp(&v))),
                }
            }
            (Operand::Texts(values, order), FieldValue::Text(x)) => {
                let sensitive = order.is_case_sensitive();
                let x = fold(x, sensitive);
                let found = values.iter().any(|v| fold(v, sensitive) == x);
                self.membership(found)
            }
            (Operand::Bytes(v), FieldValue::Bytes(x)) => self.compare(Some(x.as_slice().cmp(v.as_slice()))),
            (_, actual) => Err(self.mismatch(actual)),
        }
    }

    fn rebind(&mut self, operand: Operand) -> EngineResult<()> {
        let compatible = matches!(
            (&self.operand, &operand),
            (Operand::Int(_), Operand::Int(_))
                | (Operand::IntRange(..), Operand::IntRange(..))
                | (Operand::Float(_), Operand::Float(_))
                | (Operand::FloatRange(..), Operand::FloatRange(..))
                | (Operand::Text(..), Operand::Text(..))
        );
        if !compatible {
            return Err(EngineError::ParameterTypeMismatch {
                property: self.property.id(),
                expected: self.operand.kind().to_string(),
                actual: operand.kind().to_string(),
            });
        }
        // Text slots keep the comparison mode they were compiled with.
        self.operand = match (operand, &self.operand) {
            (Operand::Text(value, _), Operand::Text(_, order)) => Operand::Text(value, *order),
            (operand, _) => operand,
        };
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Slot(usize),
    Combined(Combinator, Box<Node>, Box<Node>),
}

#[derive(Debug, Clone, Copy)]
struct SortKey {
    property: PropertyId,
    flags: OrderFlags,
}

/// A compiled predicate tree with its sort keys.
#[derive(Debug, Default)]
pub(crate) struct Plan {
    slots: Vec<Slot>,
    root: Option<Node>,
    order: Vec<SortKey>,
}

impl Plan {
    pub(crate) fn matches<R: Record>(&self, row: &R) -> EngineResult<bool> {
        self.root
            .as_ref()
            .map_or(Ok(true), |root| self.eval(root, row))
    }

    fn eval<R: Record>(&self, node: &Node, row: &R) -> EngineResult<bool> {
        match node {
            Node::Slot(index) => {
                let slot = self
                    .slots
                    .get(*index)
                    .ok_or_else(|| EngineError::CorruptPlan(format!("dangling slot {index}")))?;
                slot.matches(&row.value(slot.property.id()))
            }
            Node::Combined(Combinator::And, left, right) => {
                Ok(self.eval(left, row)? && self.eval(right, row)?)
            }
            Node::Combined(Combinator::Or, left, right) => {
                Ok(self.eval(left, row)? || self.eval(right, row)?)
            }
        }
    }

    /// Stable sort by the plan's keys; rows arrive in id order.
    pub(crate) fn sort<R: Record>(&self, rows: &mut [R]) {
        if self.order.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            self.order
                .iter()
                .map(|key| {
                    compare_values(&a.value(key.property), &b.value(key.property), key.flags)
                })
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        });
    }

    fn slot_mut(&mut self, property: PropertyId, alias: Option<&str>) -> EngineResult<&mut Slot> {
        let candidates: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.property.id() == property)
            .filter(|(_, slot)| alias.map_or(true, |a| slot.alias.as_deref() == Some(a)))
            .map(|(index, _)| index)
            .collect();

        match candidates.as_slice() {
            [] => Err(EngineError::ParameterNotFound {
                property,
                alias: alias.map(str::to_string),
            }),
            [index] => Ok(&mut self.slots[*index]),
            _ => Err(EngineError::AmbiguousParameter { property }),
        }
    }

    pub(crate) fn set_int(&mut self, property: PropertyId, alias: Option<&str>, value: i64) -> EngineResult<()> {
        self.slot_mut(property, alias)?.rebind(Operand::Int(value))
    }

    pub(crate) fn set_float(&mut self, property: PropertyId, alias: Option<&str>, value: f64) -> EngineResult<()> {
        self.slot_mut(property, alias)?.rebind(Operand::Float(value))
    }

    pub(crate) fn set_text(&mut self, property: PropertyId, alias: Option<&str>, value: &str) -> EngineResult<()> {
        self.slot_mut(property, alias)?
            .rebind(Operand::Text(value.to_string(), StringOrder::default()))
    }

    pub(crate) fn set_int_range(
        &mut self,
        property: PropertyId,
        alias: Option<&str>,
        low: i64,
        high: i64,
    ) -> EngineResult<()> {
        self.slot_mut(property, alias)?.rebind(Operand::IntRange(low, high))
    }

    pub(crate) fn set_float_range(
        &mut self,
        property: PropertyId,
        alias: Option<&str>,
        low: f64,
        high: f64,
    ) -> EngineResult<()> {
        self.slot_mut(property, alias)?
            .rebind(Operand::FloatRange(low, high))
    }

    pub(crate) fn describe(&self) -> String {
        let mut out = String::from("Query for ");
        match &self.root {
            Some(root) => self.describe_node(root, &mut out),
            None => out.push_str("all entities"),
        }
        if !self.order.is_empty() {
            out.push_str(" order by ");
            let keys: Vec<String> = self
                .order
                .iter()
                .map(|key| format!("{} flags={}", key.property, key.flags.bits()))
                .collect();
            out.push_str(&keys.join(", "));
        }
        out
    }

    fn describe_node(&self, node: &Node, out: &mut String) {
        match node {
            Node::Slot(index) => match self.slots.get(*index) {
                Some(slot) => {
                    let _ = write!(out, "{} {}", slot.property, slot.op);
                    if slot.operand != Operand::None {
                        let _ = write!(out, " {}", slot.operand);
                    }
                }
                None => out.push_str("<dangling>"),
            },
            Node::Combined(combinator, left, right) => {
                out.push('(');
                self.describe_node(left, out);
                out.push_str(match combinator {
                    Combinator::And => " AND ",
                    Combinator::Or => " OR ",
                });
                self.describe_node(right, out);
                out.push(')');
            }
        }
    }

    pub(crate) fn describe_parameters(&self) -> String {
        let lines: Vec<String> = self
            .slots
            .iter()
            .filter(|slot| slot.operand != Operand::None)
            .map(|slot| match &slot.alias {
                Some(alias) => format!("{} (alias {alias}) = {}", slot.property, slot.operand),
                None => format!("{} = {}", slot.property, slot.operand),
            })
            .collect();
        lines.join("\n")
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue, flags: OrderFlags) -> Ordering {
    let nulls = if flags.contains(OrderFlags::NULLS_LAST) {
        Ordering::Greater
    } else {
        Ordering::Less
    };
    let ord = match (a, b) {
        (FieldValue::Null, FieldValue::Null) => return Ordering::Equal,
        (FieldValue::Null, _) => return nulls,
        (_, FieldValue::Null) => return nulls.reverse(),
        (FieldValue::Int(x), FieldValue::Int(y)) => x.cmp(y),
        (FieldValue::Float(x), FieldValue::Float(y)) => x.total_cmp(y),
        (FieldValue::Text(x), FieldValue::Text(y)) => {
            let sensitive = flags.contains(OrderFlags::CASE_SENSITIVE);
            fold(x, sensitive).cmp(&fold(y, sensitive))
        }
        (FieldValue::Bytes(x), FieldValue::Bytes(y)) => x.cmp(y),
        _ => Ordering::Equal,
    };
    if flags.contains(OrderFlags::DESCENDING) {
        ord.reverse()
    } else {
        ord
    }
}

/// Live plans of one engine, keyed by raw handle.
#[derive(Debug)]
pub(crate) struct PlanTable {
    plans: Mutex<HashMap<u64, Arc<RwLock<Plan>>>>,
    next_handle: AtomicU64,
    destroyed: AtomicU64,
}

impl Default for PlanTable {
    fn default() -> Self {
        Self {
            plans: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            destroyed: AtomicU64::new(0),
        }
    }
}

impl PlanTable {
    fn insert(&self, plan: Plan) -> EngineResult<QueryHandle> {
        let raw = self.next_handle.fetch_add(1, AtomicOrdering::Relaxed);
        let handle = QueryHandle::from_raw(raw)
            .ok_or_else(|| EngineError::Backend("query handle space exhausted".to_string()))?;
        self.plans
            .lock()
            .map_err(|_| lock_err("plan table"))?
            .insert(raw, Arc::new(RwLock::new(plan)));
        Ok(handle)
    }

    pub(crate) fn get(&self, handle: QueryHandle) -> EngineResult<Arc<RwLock<Plan>>> {
        self.plans
            .lock()
            .map_err(|_| lock_err("plan table"))?
            .get(&handle.raw())
            .cloned()
            .ok_or(EngineError::InvalidHandle(handle.raw()))
    }

    pub(crate) fn remove(&self, handle: QueryHandle) -> EngineResult<()> {
        let removed = self
            .plans
            .lock()
            .map_err(|_| lock_err("plan table"))?
            .remove(&handle.raw());
        if removed.is_none() {
            return Err(EngineError::InvalidHandle(handle.raw()));
        }
        self.destroyed.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(())
    }

    pub(crate) fn live(&self) -> usize {
        self.plans.lock().map_or(0, |plans| plans.len())
    }

    pub(crate) fn destroyed(&self) -> u64 {
        self.destroyed.load(AtomicOrdering::Relaxed)
    }
}

/// Native builder of the in-memory engine.
pub(crate) struct MemoryQueryBuilder {
    table: Arc<PlanTable>,
    slots: Vec<Slot>,
    pending: Vec<Node>,
    order: Vec<SortKey>,
}

impl MemoryQueryBuilder {
    pub(crate) fn new(table: Arc<PlanTable>) -> Self {
        Self {
            table,
            slots: Vec::new(),
            pending: Vec::new(),
            order: Vec::new(),
        }
    }

    fn push(&mut self, property: &Property, op: Operation, operand: Operand) -> EngineResult<()> {
        if !operand.accepts(property.property_type()) {
            return Err(EngineError::PropertyType {
                property: property.id(),
                operation: format!("{op} with {} operand", operand.kind()),
            });
        }
        self.pending.push(Node::Slot(self.slots.len()));
        self.slots.push(Slot {
            property: property.clone(),
            alias: None,
            op,
            operand,
        });
        Ok(())
    }
}

impl ConditionSink for MemoryQueryBuilder {
    fn is_null(&mut self, property: &Property) -> EngineResult<()> {
        self.push(property, Operation::IsNull, Operand::None)
    }

    fn not_null(&mut self, property: &Property) -> EngineResult<()> {
        self.push(property, Operation::NotNull, Operand::None)
    }

    fn equal_int(&mut self, property: &Property, value: i64) -> EngineResult<()> {
        self.push(property, Operation::Equal, Operand::Int(value))
    }

    fn not_equal_int(&mut self, property: &Property, value: i64) -> EngineResult<()> {
        self.push(property, Operation::NotEqual, Operand::Int(value))
    }

    fn greater_int(&mut self, property: &Property, value: i64) -> EngineResult<()> {
        self.push(property, Operation::Greater, Operand::Int(value))
    }

    fn less_int(&mut self, property: &Property, value: i64) -> EngineResult<()> {
        self.push(property, Operation::Less, Operand::Int(value))
    }

    fn between_int(&mut self, property: &Property, low: i64, high: i64) -> EngineResult<()> {
        self.push(property, Operation::Between, Operand::IntRange(low, high))
    }

    fn greater_float(&mut self, property: &Property, value: f64) -> EngineResult<()> {
        self.push(property, Operation::Greater, Operand::Float(value))
    }

    fn less_float(&mut self, property: &Property, value: f64) -> EngineResult<()> {
        self.push(property, Operation::Less, Operand::Float(value))
    }

    fn between_float(&mut self, property: &Property, low: f64, high: f64) -> EngineResult<()> {
        self.push(property, Operation::Between, Operand::FloatRange(low, high))
    }

    fn in_ints(&mut self, property: &Property, values: &[i32]) -> EngineResult<()> {
        let values = values.iter().copied().map(i64::from).collect();
        self.push(property, Operation::In, Operand::Ints(values))
    }

    fn not_in_ints(&mut self, property: &Property, values: &[i32]) -> EngineResult<()> {
        let values = values.iter().copied().map(i64::from).collect();
        self.push(property, Operation::NotIn, Operand::Ints(values))
    }

    fn in_longs(&mut self, property: &Property, values: &[i64]) -> EngineResult<()> {
        self.push(property, Operation::In, Operand::Ints(values.to_vec()))
    }

    fn not_in_longs(&mut self, property: &Property, values: &[i64]) -> EngineResult<()> {
        self.push(property, Operation::NotIn, Operand::Ints(values.to_vec()))
    }

    fn equal_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()> {
        self.push(property, Operation::Equal, Operand::Text(value.to_string(), order))
    }

    fn not_equal_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()> {
        self.push(property, Operation::NotEqual, Operand::Text(value.to_string(), order))
    }

    fn greater_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()> {
        self.push(property, Operation::Greater, Operand::Text(value.to_string(), order))
    }

    fn less_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()> {
        self.push(property, Operation::Less, Operand::Text(value.to_string(), order))
    }

    fn contains_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()> {
        self.push(property, Operation::Contains, Operand::Text(value.to_string(), order))
    }

    fn starts_with_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()> {
        self.push(property, Operation::StartsWith, Operand::Text(value.to_string(), order))
    }

    fn ends_with_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()> {
        self.push(property, Operation::EndsWith, Operand::Text(value.to_string(), order))
    }

    fn in_texts(&mut self, property: &Property, values: &[String], order: StringOrder) -> EngineResult<()> {
        self.push(property, Operation::In, Operand::Texts(values.to_vec(), order))
    }

    fn equal_bytes(&mut self, property: &Property, value: &[u8]) -> EngineResult<()> {
        self.push(property, Operation::Equal, Operand::Bytes(value.to_vec()))
    }

    fn greater_bytes(&mut self, property: &Property, value: &[u8]) -> EngineResult<()> {
        self.push(property, Operation::Greater, Operand::Bytes(value.to_vec()))
    }

    fn less_bytes(&mut self, property: &Property, value: &[u8]) -> EngineResult<()> {
        self.push(property, Operation::Less, Operand::Bytes(value.to_vec()))
    }

    fn parameter_alias(&mut self, alias: &str) -> EngineResult<()> {
        let slot = self
            .slots
            .last_mut()
            .ok_or_else(|| EngineError::CorruptPlan("alias before any condition".to_string()))?;
        slot.alias = Some(alias.to_string());
        Ok(())
    }

    fn combine(&mut self, combinator: Combinator) -> EngineResult<()> {
        let (Some(right), Some(left)) = (self.pending.pop(), self.pending.pop()) else {
            return Err(EngineError::CorruptPlan(format!(
                "{combinator:?} needs two pending conditions"
            )));
        };
        self.pending
            .push(Node::Combined(combinator, Box::new(left), Box::new(right)));
        Ok(())
    }
}

impl NativeQueryBuilder for MemoryQueryBuilder {
    fn order(&mut self, property: &Property, flags: OrderFlags) -> EngineResult<()> {
        self.order.push(SortKey {
            property: property.id(),
            flags,
        });
        Ok(())
    }

    fn build(self: Box<Self>) -> EngineResult<QueryHandle> {
        let Self {
            table,
            slots,
            pending,
            order,
        } = *self;
        let root = pending
            .into_iter()
            .reduce(|left, right| Node::Combined(Combinator::And, Box::new(left), Box::new(right)));
        table.insert(Plan { slots, root, order })
    }
}
