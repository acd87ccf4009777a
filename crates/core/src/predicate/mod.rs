#![forbid(unsafe_code)]

use crate::schema::validate_identifier;
use crate::value::Value;
use std::collections::HashMap;

#[cfg(test)]
mod tests;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
    Like,
    Between,
}

impl Operator {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "<>",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LessOrEqual => "<=",
            Self::GreaterOrEqual => ">=",
            Self::Like => "LIKE",
            Self::Between => "BETWEEN",
        }
    }

    /// Short tag used in placeholder names.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Equals => "eq",
            Self::NotEquals => "ne",
            Self::LessThan => "lt",
            Self::GreaterThan => "gt",
            Self::LessOrEqual => "le",
            Self::GreaterOrEqual => "ge",
            Self::Like => "like",
            Self::Between => "between",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Single(Value),
    Range(Value, Value),
}

/// One typed comparison: `column <op> operand`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    column: String,
    operator: Operator,
    operand: Operand,
}

impl Predicate {
    fn single(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            operand: Operand::Single(value.into()),
        }
    }

    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Operator::Equals, value)
    }

    pub fn not_equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Operator::NotEquals, value)
    }

    pub fn less_than(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Operator::LessThan, value)
    }

    pub fn greater_than(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Operator::GreaterThan, value)
    }

    pub fn less_or_equal(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Operator::LessOrEqual, value)
    }

    pub fn greater_or_equal(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Operator::GreaterOrEqual, value)
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Self::single(column, Operator::Like, pattern)
    }

    pub fn between(
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self {
            column: column.into(),
            operator: Operator::Between,
            operand: Operand::Range(low.into(), high.into()),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Join {
    #[default]
    All,
    Any,
}

impl Join {
    fn sql(self) -> &'static str {
        match self {
            Self::All => " AND ",
            Self::Any => " OR ",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PredicateList {
    predicates: Vec<Predicate>,
    join: Join,
}

impl PredicateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conjunction: every predicate must hold.
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self {
            predicates: predicates.into_iter().collect(),
            join: Join::All,
        }
    }

    /// Disjunction: at least one predicate must hold.
    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self {
            predicates: predicates.into_iter().collect(),
            join: Join::Any,
        }
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn join(&self) -> Join {
        self.join
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.predicates.iter().map(Predicate::column)
    }

    pub fn to_where(&self) -> Result<WhereClause, PredicateError> {
        let mut used: HashMap<String, usize> = HashMap::new();
        let mut terms = Vec::with_capacity(self.predicates.len());
        let mut params = Vec::new();

        for predicate in &self.predicates {
            validate_identifier(&predicate.column).map_err(|_| PredicateError::InvalidColumn {
                name: predicate.column.clone(),
            })?;

            let column = predicate.column.as_str();
            let base = format!("{column}_{}", predicate.operator.tag());

            match (&predicate.operand, predicate.operator) {
                (Operand::Single(Value::Null), Operator::Equals) => {
                    terms.push(format!("{column} IS NULL"));
                }
                (Operand::Single(Value::Null), Operator::NotEquals) => {
                    terms.push(format!("{column} IS NOT NULL"));
                }
                (Operand::Single(Value::Null), _)
                | (Operand::Range(Value::Null, _), _)
                | (Operand::Range(_, Value::Null), _) => {
                    return Err(PredicateError::NullOperand {
                        column: predicate.column.clone(),
                    });
                }
                (Operand::Range(low, high), Operator::Between) => {
                    let name = unique_name(&mut used, &base);
                    let low_name = format!(":{name}_lo");
                    let high_name = format!(":{name}_hi");
                    terms.push(format!("{column} BETWEEN {low_name} AND {high_name}"));
                    params.push((low_name, low.clone()));
                    params.push((high_name, high.clone()));
                }
                (Operand::Single(value), operator) if operator != Operator::Between => {
                    let name = format!(":{}", unique_name(&mut used, &base));
                    terms.push(format!("{column} {} {name}", operator.sql()));
                    params.push((name, value.clone()));
                }
                _ => {
                    return Err(PredicateError::OperandShape {
                        column: predicate.column.clone(),
                    });
                }
            }
        }

        Ok(WhereClause {
            fragment: terms.join(self.join.sql()),
            params,
        })
    }
}

impl From<Predicate> for PredicateList {
    fn from(value: Predicate) -> Self {
        Self::all([value])
    }
}

fn unique_name(used: &mut HashMap<String, usize>, base: &str) -> String {
    let count = used.entry(base.to_string()).or_insert(0);
    *count += 1;
    if *count == 1 {
        base.to_string()
    } else {
        format!("{base}_{count}")
    }
}

/// A rendered WHERE fragment with its named bind values, in placeholder
/// order.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct WhereClause {
    fragment: String,
    params: Vec<(String, Value)>,
}

impl WhereClause {
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.params.iter().map(|(_, value)| value)
    }

    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PredicateError {
    InvalidColumn { name: String },
    NullOperand { column: String },
    OperandShape { column: String },
}

impl PredicateError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidColumn { .. } => "predicate column is not a valid identifier",
            Self::NullOperand { .. } => "only equals/not-equals accept a NULL operand",
            Self::OperandShape { .. } => "BETWEEN takes two operands, other operators take one",
        }
    }
}

impl std::fmt::Display for PredicateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidColumn { name } => write!(f, "{} ({name})", self.message()),
            Self::NullOperand { column } | Self::OperandShape { column } => {
                write!(f, "{} ({column})", self.message())
            }
        }
    }
}
