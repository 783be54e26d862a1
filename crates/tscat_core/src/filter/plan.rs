//! Predicate planning: validation and dynamic-catalogue expansion.
//!
//! # Responsibility
//! - Resolve field names against the target kind's field table.
//! - Compile regexes once per call.
//! - Inline the stored predicate of every referenced dynamic catalogue.
//!
//! # Invariants
//! - A plan is built once per top-level query and shared by every candidate.
//! - Nodes are addressed by index; each catalogue is expanded at most once.
//! - A catalogue reached again along its own expansion path is a recursion
//!   error.

use crate::filter::predicate::{ComparisonOp, Literal, Operand, Predicate};
use crate::filter::{FilterError, FilterResult};
use crate::model::entity::EntityKind;
use regex::Regex;
use std::collections::HashMap;
use uuid::Uuid;

pub(crate) type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldType {
    Text,
    Timestamp,
    Integer,
    StringList,
}

/// Filterable fixed field; `name` doubles as the storage column.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FieldSpec {
    pub(crate) name: &'static str,
    pub(crate) ty: FieldType,
}

const EVENT_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "uuid", ty: FieldType::Text },
    FieldSpec { name: "start", ty: FieldType::Timestamp },
    FieldSpec { name: "stop", ty: FieldType::Timestamp },
    FieldSpec { name: "author", ty: FieldType::Text },
    FieldSpec { name: "tags", ty: FieldType::StringList },
    FieldSpec { name: "products", ty: FieldType::StringList },
    FieldSpec { name: "rating", ty: FieldType::Integer },
];

const CATALOGUE_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "uuid", ty: FieldType::Text },
    FieldSpec { name: "name", ty: FieldType::Text },
    FieldSpec { name: "author", ty: FieldType::Text },
    FieldSpec { name: "tags", ty: FieldType::StringList },
];

pub(crate) fn lookup_field(kind: EntityKind, name: &str) -> Option<&'static FieldSpec> {
    let fields = match kind {
        EntityKind::Event => EVENT_FIELDS,
        EntityKind::Catalogue => CATALOGUE_FIELDS,
    };
    fields.iter().find(|field| field.name == name)
}

/// Read access to catalogues needed while planning and evaluating.
pub trait CatalogueLookup {
    /// Stored predicate of a catalogue; `Ok(None)` for static catalogues.
    ///
    /// # Errors
    /// - [`FilterError::CatalogueNotFound`] when no such catalogue exists.
    fn catalogue_predicate(&self, catalogue: Uuid) -> FilterResult<Option<Predicate>>;

    /// Whether `event` is an explicit member of `catalogue`, or of any
    /// catalogue when `catalogue` is `None`.
    fn is_assigned(&self, event: Uuid, catalogue: Option<Uuid>) -> FilterResult<bool>;
}

#[derive(Debug, Clone)]
pub(crate) enum PlanOperand {
    Field(&'static FieldSpec),
    Attribute(String),
}

#[derive(Debug, Clone)]
pub(crate) enum PlanNode {
    Comparison {
        op: ComparisonOp,
        operand: PlanOperand,
        rhs: Literal,
    },
    Match {
        operand: PlanOperand,
        regex: Regex,
    },
    Has {
        attribute: String,
    },
    In {
        value: String,
        operand: PlanOperand,
    },
    Not(NodeId),
    All(Vec<NodeId>),
    Any(Vec<NodeId>),
    InCatalogue {
        catalogue: Uuid,
        expansion: Option<NodeId>,
    },
    InNoCatalogue,
}

/// Validated, catalogue-expanded form of one predicate.
#[derive(Debug, Clone)]
pub struct PredicatePlan {
    target: EntityKind,
    nodes: Vec<PlanNode>,
    root: NodeId,
}

impl PredicatePlan {
    /// Plans `predicate` for candidates of kind `target`.
    ///
    /// # Errors
    /// - `UnknownField`, `InvalidRegex` for malformed leaves.
    /// - `CatalogueFilter` for `InCatalogue` on a catalogue target.
    /// - `Recursion` when dynamic catalogues reference each other in a cycle.
    /// - `CatalogueNotFound` for an `InCatalogue` naming no stored catalogue.
    pub fn build<L>(predicate: &Predicate, target: EntityKind, lookup: &L) -> FilterResult<Self>
    where
        L: CatalogueLookup + ?Sized,
    {
        let mut builder = PlanBuilder {
            target,
            lookup,
            nodes: Vec::new(),
            visiting: Vec::new(),
            expanded: HashMap::new(),
        };
        let root = builder.lower(predicate)?;
        Ok(Self {
            target,
            nodes: builder.nodes,
            root,
        })
    }

    pub fn target(&self) -> EntityKind {
        self.target
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn node(&self, id: NodeId) -> &PlanNode {
        &self.nodes[id]
    }
}

struct PlanBuilder<'l, L: ?Sized> {
    target: EntityKind,
    lookup: &'l L,
    nodes: Vec<PlanNode>,
    visiting: Vec<Uuid>,
    expanded: HashMap<Uuid, Option<NodeId>>,
}

impl<L> PlanBuilder<'_, L>
where
    L: CatalogueLookup + ?Sized,
{
    fn lower(&mut self, predicate: &Predicate) -> FilterResult<NodeId> {
        let node = match predicate {
            Predicate::Comparison { op, lhs, rhs } => PlanNode::Comparison {
                op: *op,
                operand: self.operand(lhs)?,
                rhs: rhs.normalized(),
            },
            Predicate::Match { lhs, pattern } => {
                let operand = self.operand(lhs)?;
                let regex = Regex::new(pattern).map_err(|err| FilterError::InvalidRegex {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })?;
                PlanNode::Match { operand, regex }
            }
            Predicate::Has { attribute } => PlanNode::Has {
                attribute: attribute.clone(),
            },
            Predicate::In { value, lhs } => PlanNode::In {
                value: value.clone(),
                operand: self.operand(lhs)?,
            },
            Predicate::Not(inner) => PlanNode::Not(self.lower(inner)?),
            Predicate::All(predicates) => PlanNode::All(self.lower_all(predicates)?),
            Predicate::Any(predicates) => PlanNode::Any(self.lower_all(predicates)?),
            Predicate::InCatalogue { catalogue } => {
                if self.target == EntityKind::Catalogue {
                    return Err(FilterError::CatalogueFilter);
                }
                match catalogue {
                    Some(uuid) => PlanNode::InCatalogue {
                        catalogue: *uuid,
                        expansion: self.expand(*uuid)?,
                    },
                    None => PlanNode::InNoCatalogue,
                }
            }
        };
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    fn lower_all(&mut self, predicates: &[Predicate]) -> FilterResult<Vec<NodeId>> {
        predicates
            .iter()
            .map(|predicate| self.lower(predicate))
            .collect()
    }

    fn operand(&self, operand: &Operand) -> FilterResult<PlanOperand> {
        match operand {
            Operand::Field(name) => lookup_field(self.target, name)
                .map(PlanOperand::Field)
                .ok_or_else(|| FilterError::UnknownField {
                    kind: self.target,
                    name: name.clone(),
                }),
            Operand::Attribute(name) => Ok(PlanOperand::Attribute(name.clone())),
        }
    }

    fn expand(&mut self, catalogue: Uuid) -> FilterResult<Option<NodeId>> {
        if self.visiting.contains(&catalogue) {
            return Err(FilterError::Recursion(catalogue));
        }
        if let Some(expansion) = self.expanded.get(&catalogue) {
            return Ok(*expansion);
        }

        let expansion = match self.lookup.catalogue_predicate(catalogue)? {
            Some(predicate) => {
                self.visiting.push(catalogue);
                let lowered = self.lower(&predicate);
                self.visiting.pop();
                Some(lowered?)
            }
            None => None,
        };
        self.expanded.insert(catalogue, expansion);
        Ok(expansion)
    }
}
