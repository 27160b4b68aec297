//! The declarative expression surface.
//!
//! Predicates, orderings, projections and aggregates are all built from
//! [`Expr`], an explicit tagged AST. The fluent methods below are the only
//! construction surface; translation to SQL lives in [`translate`].

use chrono::{DateTime, Duration, FixedOffset, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::types::{IntoValue, Value};

pub(crate) mod translate;

/// A node of the expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a column of the source entity.
    Column(String),
    /// A literal; always emitted as a bind parameter.
    Value(Value),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Set membership over literal values. An empty list translates to `1 = 0`.
    In {
        expr: Box<Expr>,
        list: Vec<Value>,
    },
    /// Inclusive range check.
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    /// Substring match; the needle is escaped, wildcards come from `position`.
    Like {
        expr: Box<Expr>,
        needle: String,
        position: Match,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    NotNullOrEmpty(Box<Expr>),
    NotNullOrWhitespace(Box<Expr>),
    Case {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Aggregate {
        function: AggregateFunction,
        arg: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Where the wildcards of a LIKE pattern go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    Anywhere,
    Prefix,
    Suffix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Upper,
    Lower,
    Trim,
    Length,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

/// Reference a column of the queried entity.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Lift a literal into the expression tree.
pub fn val(value: impl IntoValue) -> Expr {
    Expr::Value(value.into_value())
}

/// Conversion into an expression node: either an [`Expr`] already, or a
/// literal that becomes a bind parameter.
pub trait IntoExpr {
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

macro_rules! impl_into_expr_for_values {
    ($($ty:ty),* $(,)?) => {
        $(impl IntoExpr for $ty {
            fn into_expr(self) -> Expr {
                Expr::Value(self.into_value())
            }
        })*
    };
}

impl_into_expr_for_values!(
    bool,
    i16,
    i32,
    i64,
    u32,
    f32,
    f64,
    Decimal,
    String,
    &str,
    Vec<u8>,
    DateTime<Utc>,
    DateTime<FixedOffset>,
    Duration,
    Uuid,
    Value,
);

impl<T> IntoExpr for Option<T>
where
    T: IntoValue,
{
    fn into_expr(self) -> Expr {
        Expr::Value(self.into_value())
    }
}

macro_rules! binary {
    ($(#[$doc:meta])* $name:ident, $op:ident) => {
        $(#[$doc])*
        pub fn $name(self, rhs: impl IntoExpr) -> Expr {
            Expr::Binary {
                op: BinaryOp::$op,
                lhs: Box::new(self),
                rhs: Box::new(rhs.into_expr()),
            }
        }
    };
}

impl Expr {
    binary!(
        /// `self = rhs`; a NULL literal on either side becomes `IS NULL`.
        eq, Eq);
    binary!(
        /// `self <> rhs`; a NULL literal on either side becomes `IS NOT NULL`.
        ne, Ne);
    binary!(lt, Lt);
    binary!(le, Le);
    binary!(gt, Gt);
    binary!(ge, Ge);
    binary!(and, And);
    binary!(or, Or);
    binary!(add, Add);
    binary!(sub, Sub);
    binary!(mul, Mul);
    binary!(div, Div);
    binary!(rem, Rem);

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// `self IN (values…)`. An empty collection yields no rows.
    pub fn is_in<I, T>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: IntoValue,
    {
        Expr::In {
            expr: Box::new(self),
            list: values.into_iter().map(IntoValue::into_value).collect(),
        }
    }

    /// `self BETWEEN low AND high`, inclusive on both ends.
    pub fn between(self, low: impl IntoExpr, high: impl IntoExpr) -> Expr {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into_expr()),
            high: Box::new(high.into_expr()),
        }
    }

    pub fn contains(self, needle: impl Into<String>) -> Expr {
        Expr::Like {
            expr: Box::new(self),
            needle: needle.into(),
            position: Match::Anywhere,
        }
    }

    pub fn starts_with(self, needle: impl Into<String>) -> Expr {
        Expr::Like {
            expr: Box::new(self),
            needle: needle.into(),
            position: Match::Prefix,
        }
    }

    pub fn ends_with(self, needle: impl Into<String>) -> Expr {
        Expr::Like {
            expr: Box::new(self),
            needle: needle.into(),
            position: Match::Suffix,
        }
    }

    pub fn upper(self) -> Expr {
        Expr::Call {
            function: Function::Upper,
            args: vec![self],
        }
    }

    pub fn lower(self) -> Expr {
        Expr::Call {
            function: Function::Lower,
            args: vec![self],
        }
    }

    pub fn trim(self) -> Expr {
        Expr::Call {
            function: Function::Trim,
            args: vec![self],
        }
    }

    pub fn length(self) -> Expr {
        Expr::Call {
            function: Function::Length,
            args: vec![self],
        }
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// Non-NULL and not the empty string.
    pub fn is_not_null_or_empty(self) -> Expr {
        Expr::NotNullOrEmpty(Box::new(self))
    }

    /// Non-NULL and containing at least one non-whitespace character.
    pub fn is_not_null_or_whitespace(self) -> Expr {
        Expr::NotNullOrWhitespace(Box::new(self))
    }

    /// `CASE WHEN self THEN then ELSE otherwise END`.
    pub fn then_else(self, then: impl IntoExpr, otherwise: impl IntoExpr) -> Expr {
        Expr::Case {
            condition: Box::new(self),
            then: Box::new(then.into_expr()),
            otherwise: Box::new(otherwise.into_expr()),
        }
    }

    /// `COUNT(*)`.
    pub fn count_all() -> Expr {
        Expr::Aggregate {
            function: AggregateFunction::Count,
            arg: None,
        }
    }

    pub fn aggregate(function: AggregateFunction, arg: Expr) -> Expr {
        Expr::Aggregate {
            function,
            arg: Some(Box::new(arg)),
        }
    }

    /// Conjoin two optional predicates.
    pub(crate) fn conjoin(lhs: Option<Expr>, rhs: Expr) -> Expr {
        match lhs {
            Some(lhs) => lhs.and(rhs),
            None => rhs,
        }
    }
}
