//! Compilation of predicate plans into SQLite `WHERE` fragments.
//!
//! # Invariants
//! - Every compiled fragment evaluates to 0 or 1, never NULL, so `NOT`
//!   behaves exactly like the in-memory evaluator.
//! - Placeholders are positional `?`; binds are returned in textual order.
//! - Fragments reference the target table by its plain name
//!   (`events` / `catalogues`).

use crate::filter::plan::{FieldType, NodeId, PlanNode, PlanOperand, PredicatePlan};
use crate::filter::predicate::Literal;
use crate::model::entity::EntityKind;
use crate::model::value::{format_timestamp, ValueKind};
use rusqlite::types::Value;

/// One SQL boolean expression plus its bind values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SqlFragment {
    pub(crate) sql: String,
    pub(crate) binds: Vec<Value>,
}

pub(crate) fn entity_table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Event => "events",
        EntityKind::Catalogue => "catalogues",
    }
}

pub(crate) fn attribute_table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Event => "event_attributes",
        EntityKind::Catalogue => "catalogue_attributes",
    }
}

pub(crate) fn compile(plan: &PredicatePlan) -> SqlFragment {
    let mut compiler = SqlCompiler {
        plan,
        table: entity_table(plan.target()),
        attributes: attribute_table(plan.target()),
        sql: String::new(),
        binds: Vec::new(),
    };
    compiler.node(plan.root());
    SqlFragment {
        sql: compiler.sql,
        binds: compiler.binds,
    }
}

struct SqlCompiler<'p> {
    plan: &'p PredicatePlan,
    table: &'static str,
    attributes: &'static str,
    sql: String,
    binds: Vec<Value>,
}

impl SqlCompiler<'_> {
    fn node(&mut self, id: NodeId) {
        match self.plan.node(id) {
            PlanNode::Comparison { op, operand, rhs } => self.comparison(op.as_str(), operand, rhs),
            PlanNode::Match { operand, regex } => {
                let pattern = regex.as_str().to_string();
                match operand {
                    PlanOperand::Field(field) if field.ty == FieldType::Text => {
                        self.sql
                            .push_str(&format!("({}.{} REGEXP ?)", self.table, field.name));
                        self.binds.push(Value::Text(pattern));
                    }
                    PlanOperand::Field(_) => self.sql.push('0'),
                    PlanOperand::Attribute(name) => {
                        self.attribute_exists(name, "a.kind = ? AND a.value REGEXP ?");
                        self.binds.push(Value::Text(ValueKind::String.as_str().to_string()));
                        self.binds.push(Value::Text(pattern));
                    }
                }
            }
            PlanNode::Has { attribute } => self.attribute_exists(attribute, "1"),
            PlanNode::In { value, operand } => match operand {
                PlanOperand::Field(field) if field.ty == FieldType::StringList => {
                    self.sql.push_str(&format!(
                        "EXISTS (SELECT 1 FROM json_each({}.{}) j WHERE j.value = ?)",
                        self.table, field.name
                    ));
                    self.binds.push(Value::Text(value.clone()));
                }
                PlanOperand::Field(_) => self.sql.push('0'),
                PlanOperand::Attribute(name) => {
                    self.attribute_exists(
                        name,
                        "EXISTS (SELECT 1 FROM json_each(\
                         CASE WHEN a.kind = 'string_list' THEN a.value ELSE '[]' END) j \
                         WHERE j.value = ?)",
                    );
                    self.binds.push(Value::Text(value.clone()));
                }
            },
            PlanNode::Not(inner) => {
                self.sql.push_str("(NOT ");
                self.node(*inner);
                self.sql.push(')');
            }
            PlanNode::All(children) => self.junction(children, " AND ", '1'),
            PlanNode::Any(children) => self.junction(children, " OR ", '0'),
            PlanNode::InCatalogue {
                catalogue,
                expansion,
            } => {
                self.sql.push_str(
                    "(EXISTS (SELECT 1 FROM event_in_catalogue m \
                     INNER JOIN catalogues c ON c.id = m.catalogue_id \
                     WHERE m.event_id = events.id AND c.uuid = ?)",
                );
                self.binds.push(Value::Text(catalogue.to_string()));
                if let Some(expansion) = expansion {
                    self.sql.push_str(" OR ");
                    self.node(*expansion);
                }
                self.sql.push(')');
            }
            PlanNode::InNoCatalogue => self.sql.push_str(
                "(NOT EXISTS (SELECT 1 FROM event_in_catalogue m WHERE m.event_id = events.id))",
            ),
        }
    }

    fn comparison(&mut self, op: &'static str, operand: &PlanOperand, rhs: &Literal) {
        match operand {
            PlanOperand::Field(field) => {
                let column = format!("{}.{}", self.table, field.name);
                match (field.ty, rhs) {
                    (FieldType::Text, Literal::String(_))
                    | (FieldType::Timestamp, Literal::Timestamp(_)) => {
                        self.sql.push_str(&format!("({column} {op} ?)"));
                        self.binds.push(literal_value(rhs));
                    }
                    (FieldType::Integer, Literal::Integer(_)) => {
                        self.sql
                            .push_str(&format!("({column} IS NOT NULL AND {column} {op} ?)"));
                        self.binds.push(literal_value(rhs));
                    }
                    _ => self.sql.push('0'),
                }
            }
            PlanOperand::Attribute(name) => {
                self.attribute_exists(name, &format!("a.kind = ? AND a.value {op} ?"));
                self.binds.push(Value::Text(literal_kind(rhs).as_str().to_string()));
                self.binds.push(literal_value(rhs));
            }
        }
    }

    /// `EXISTS` over the attribute row `name`; binds for `condition` follow.
    fn attribute_exists(&mut self, name: &str, condition: &str) {
        self.sql.push_str(&format!(
            "EXISTS (SELECT 1 FROM {} a WHERE a.entity_id = {}.id AND a.key = ? AND {condition})",
            self.attributes, self.table
        ));
        self.binds.push(Value::Text(name.to_string()));
    }

    fn junction(&mut self, children: &[NodeId], separator: &str, empty: char) {
        if children.is_empty() {
            self.sql.push(empty);
            return;
        }
        self.sql.push('(');
        for (index, child) in children.iter().enumerate() {
            if index > 0 {
                self.sql.push_str(separator);
            }
            self.node(*child);
        }
        self.sql.push(')');
    }
}

fn literal_kind(literal: &Literal) -> ValueKind {
    match literal {
        Literal::String(_) => ValueKind::String,
        Literal::Integer(_) => ValueKind::Integer,
        Literal::Float(_) => ValueKind::Float,
        Literal::Boolean(_) => ValueKind::Boolean,
        Literal::Timestamp(_) => ValueKind::Timestamp,
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::String(value) => Value::Text(value.clone()),
        Literal::Integer(value) => Value::Integer(*value),
        Literal::Float(value) => Value::Real(*value),
        Literal::Boolean(value) => Value::Integer(i64::from(*value)),
        Literal::Timestamp(value) => Value::Text(format_timestamp(value)),
    }
}
