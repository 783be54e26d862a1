//! In-memory evaluation of predicate plans.
//!
//! # Invariants
//! - A leaf whose operand is absent, null or of a mismatching type is false;
//!   `Not` of such a leaf is true.
//! - Semantics match the SQL compiler leaf for leaf.

use crate::filter::plan::{CatalogueLookup, NodeId, PlanNode, PlanOperand, PredicatePlan};
use crate::filter::predicate::Predicate;
use crate::filter::FilterResult;
use crate::model::catalogue::Catalogue;
use crate::model::entity::{Entity, EntityKind};
use crate::model::event::Event;
use crate::model::value::AttributeValue;
use std::borrow::Cow;
use uuid::Uuid;

/// Candidate view used by the evaluator.
pub(crate) trait Filterable {
    const KIND: EntityKind;

    fn filter_uuid(&self) -> Uuid;
    fn field_value(&self, name: &str) -> Option<AttributeValue>;
    fn attribute_value(&self, name: &str) -> Option<&AttributeValue>;
}

impl Filterable for Event {
    const KIND: EntityKind = EntityKind::Event;

    fn filter_uuid(&self) -> Uuid {
        self.fields().uuid
    }

    fn field_value(&self, name: &str) -> Option<AttributeValue> {
        let fields = self.fields();
        match name {
            "uuid" => Some(AttributeValue::String(fields.uuid.to_string())),
            "start" => Some(AttributeValue::Timestamp(fields.start)),
            "stop" => Some(AttributeValue::Timestamp(fields.stop)),
            "author" => Some(AttributeValue::String(fields.author.clone())),
            "tags" => Some(AttributeValue::StringList(fields.tags.clone())),
            "products" => Some(AttributeValue::StringList(fields.products.clone())),
            "rating" => fields.rating.map(AttributeValue::Integer),
            _ => None,
        }
    }

    fn attribute_value(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes().get(name)
    }
}

impl Filterable for Catalogue {
    const KIND: EntityKind = EntityKind::Catalogue;

    fn filter_uuid(&self) -> Uuid {
        self.fields().uuid
    }

    fn field_value(&self, name: &str) -> Option<AttributeValue> {
        let fields = self.fields();
        match name {
            "uuid" => Some(AttributeValue::String(fields.uuid.to_string())),
            "name" => Some(AttributeValue::String(fields.name.clone())),
            "author" => Some(AttributeValue::String(fields.author.clone())),
            "tags" => Some(AttributeValue::StringList(fields.tags.clone())),
            _ => None,
        }
    }

    fn attribute_value(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes().get(name)
    }
}

impl PredicatePlan {
    pub(crate) fn matches<T, L>(&self, candidate: &T, lookup: &L) -> FilterResult<bool>
    where
        T: Filterable,
        L: CatalogueLookup + ?Sized,
    {
        self.eval(self.root(), candidate, lookup)
    }

    fn eval<T, L>(&self, id: NodeId, candidate: &T, lookup: &L) -> FilterResult<bool>
    where
        T: Filterable,
        L: CatalogueLookup + ?Sized,
    {
        let result = match self.node(id) {
            PlanNode::Comparison { op, operand, rhs } => operand_value(operand, candidate)
                .and_then(|value| rhs.compare_from(&value))
                .is_some_and(|ordering| op.holds(ordering)),
            PlanNode::Match { operand, regex } => match operand_value(operand, candidate) {
                Some(value) => value.as_str().is_some_and(|text| regex.is_match(text)),
                None => false,
            },
            PlanNode::Has { attribute } => candidate.attribute_value(attribute).is_some(),
            PlanNode::In { value, operand } => match operand_value(operand, candidate).as_deref() {
                Some(AttributeValue::StringList(items)) => items.iter().any(|item| item == value),
                _ => false,
            },
            PlanNode::Not(inner) => !self.eval(*inner, candidate, lookup)?,
            PlanNode::All(children) => {
                for child in children {
                    if !self.eval(*child, candidate, lookup)? {
                        return Ok(false);
                    }
                }
                true
            }
            PlanNode::Any(children) => {
                for child in children {
                    if self.eval(*child, candidate, lookup)? {
                        return Ok(true);
                    }
                }
                false
            }
            PlanNode::InCatalogue {
                catalogue,
                expansion,
            } => {
                lookup.is_assigned(candidate.filter_uuid(), Some(*catalogue))?
                    || match expansion {
                        Some(node) => self.eval(*node, candidate, lookup)?,
                        None => false,
                    }
            }
            PlanNode::InNoCatalogue => !lookup.is_assigned(candidate.filter_uuid(), None)?,
        };
        Ok(result)
    }
}

fn operand_value<'c, T: Filterable>(
    operand: &PlanOperand,
    candidate: &'c T,
) -> Option<Cow<'c, AttributeValue>> {
    match operand {
        PlanOperand::Field(field) => candidate.field_value(field.name).map(Cow::Owned),
        PlanOperand::Attribute(name) => candidate.attribute_value(name).map(Cow::Borrowed),
    }
}

/// Keeps the events matching `predicate`, in input order.
///
/// Invalid handles never match.
pub fn filter_events<L>(predicate: &Predicate, events: &[Event], lookup: &L) -> FilterResult<Vec<Event>>
where
    L: CatalogueLookup + ?Sized,
{
    filter_candidates(predicate, events, lookup)
}

/// Keeps the catalogues matching `predicate`, in input order.
pub fn filter_catalogues<L>(
    predicate: &Predicate,
    catalogues: &[Catalogue],
    lookup: &L,
) -> FilterResult<Vec<Catalogue>>
where
    L: CatalogueLookup + ?Sized,
{
    filter_candidates(predicate, catalogues, lookup)
}

fn filter_candidates<T, L>(predicate: &Predicate, candidates: &[T], lookup: &L) -> FilterResult<Vec<T>>
where
    T: Filterable + Entity + Clone,
    L: CatalogueLookup + ?Sized,
{
    let plan = PredicatePlan::build(predicate, <T as Filterable>::KIND, lookup)?;
    let mut matched = Vec::new();
    for candidate in candidates.iter().filter(|candidate| candidate.is_valid()) {
        if plan.matches(candidate, lookup)? {
            matched.push(candidate.clone());
        }
    }
    Ok(matched)
}
