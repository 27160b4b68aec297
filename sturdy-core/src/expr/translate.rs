//! Expression-to-SQL translation.
//!
//! [`SqlWriter`] accumulates a SQL string and its ordered bind parameters, one
//! parameter per literal occurrence. Values never appear in the SQL text and
//! identifiers are always quoted through the dialect.

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::expr::{AggregateFunction, BinaryOp, Expr, Function, Match};
use crate::meta::EntityMeta;
use crate::types::Value;

pub(crate) struct SqlWriter<'a> {
    dialect: &'a dyn Dialect,
    pub sql: String,
    pub params: Vec<Value>,
    /// When set, column references are qualified with this table or alias.
    pub qualify: Option<&'a str>,
}

impl<'a> SqlWriter<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        SqlWriter {
            dialect,
            sql: String::new(),
            params: Vec::new(),
            qualify: None,
        }
    }

    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn ident(&mut self, name: &str) {
        self.dialect.quote_into(name, &mut self.sql);
    }

    /// Append a placeholder and record its value.
    pub fn bind(&mut self, value: Value) {
        self.params.push(value);
        self.dialect.placeholder(self.params.len(), &mut self.sql);
    }

    /// Append a validated, quoted (and possibly qualified) column reference.
    pub fn column_ref(&mut self, meta: &EntityMeta, name: &str) -> Result<()> {
        if meta.column(name).is_none() {
            return Err(Error::unsupported(format!(
                "unknown column `{name}` on entity `{}`",
                meta.entity()
            )));
        }
        if let Some(qualifier) = self.qualify {
            self.dialect.quote_into(qualifier, &mut self.sql);
            self.sql.push('.');
        }
        self.ident(name);
        Ok(())
    }

    /// Translate a predicate (no aggregates permitted).
    pub fn predicate(&mut self, meta: &EntityMeta, expr: &Expr) -> Result<()> {
        self.expr(meta, expr, false)
    }

    /// Translate a scalar expression for a select list (aggregates permitted).
    pub fn scalar(&mut self, meta: &EntityMeta, expr: &Expr) -> Result<()> {
        self.expr(meta, expr, true)
    }

    fn expr(&mut self, meta: &EntityMeta, expr: &Expr, aggregates: bool) -> Result<()> {
        match expr {
            Expr::Column(name) => self.column_ref(meta, name),

            Expr::Value(value) => {
                self.bind(value.clone());
                Ok(())
            }

            Expr::Not(inner) => {
                self.push("NOT (");
                self.expr(meta, inner, aggregates)?;
                self.push(")");
                Ok(())
            }

            Expr::Binary { op, lhs, rhs } => self.binary(meta, *op, lhs, rhs, aggregates),

            Expr::In { expr, list } => {
                if list.is_empty() {
                    // an empty set matches nothing
                    self.push("1 = 0");
                    return Ok(());
                }
                self.expr(meta, expr, aggregates)?;
                self.push(" IN (");
                for (i, value) in list.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.bind(value.clone());
                }
                self.push(")");
                Ok(())
            }

            Expr::Between { expr, low, high } => {
                self.expr(meta, expr, aggregates)?;
                self.push(" BETWEEN ");
                self.expr(meta, low, aggregates)?;
                self.push(" AND ");
                self.expr(meta, high, aggregates)?;
                Ok(())
            }

            Expr::Like {
                expr,
                needle,
                position,
            } => {
                self.expr(meta, expr, aggregates)?;
                self.push(" LIKE ");
                let escaped = escape_like(needle);
                let pattern = match position {
                    Match::Anywhere => format!("%{escaped}%"),
                    Match::Prefix => format!("{escaped}%"),
                    Match::Suffix => format!("%{escaped}"),
                };
                self.bind(Value::Text(pattern));
                self.push(" ESCAPE '\\'");
                Ok(())
            }

            Expr::Call { function, args } => {
                let name = match function {
                    Function::Upper => "UPPER",
                    Function::Lower => "LOWER",
                    Function::Trim => self.dialect.trim_function(),
                    Function::Length => self.dialect.length_function(),
                };
                self.push(name);
                self.push("(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(meta, arg, aggregates)?;
                }
                self.push(")");
                Ok(())
            }

            Expr::IsNull { expr, negated } => {
                self.expr(meta, expr, aggregates)?;
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
                Ok(())
            }

            Expr::NotNullOrEmpty(inner) => {
                self.push("(");
                self.expr(meta, inner, aggregates)?;
                self.push(" IS NOT NULL AND ");
                self.expr(meta, inner, aggregates)?;
                self.push(" <> '')");
                Ok(())
            }

            Expr::NotNullOrWhitespace(inner) => {
                self.push("(");
                self.expr(meta, inner, aggregates)?;
                self.push(" IS NOT NULL AND ");
                self.push(self.dialect.trim_function());
                self.push("(");
                self.expr(meta, inner, aggregates)?;
                self.push(") <> '')");
                Ok(())
            }

            Expr::Case {
                condition,
                then,
                otherwise,
            } => {
                self.push("CASE WHEN ");
                self.expr(meta, condition, aggregates)?;
                self.push(" THEN ");
                self.expr(meta, then, aggregates)?;
                self.push(" ELSE ");
                self.expr(meta, otherwise, aggregates)?;
                self.push(" END");
                Ok(())
            }

            Expr::Aggregate { function, arg } => {
                if !aggregates {
                    return Err(Error::unsupported(
                        "aggregate function inside a predicate",
                    ));
                }
                self.push(function.as_sql());
                self.push("(");
                match arg {
                    Some(arg) => self.expr(meta, arg, false)?,
                    None => {
                        debug_assert!(matches!(function, AggregateFunction::Count));
                        self.push("*");
                    }
                }
                self.push(")");
                Ok(())
            }
        }
    }

    fn binary(
        &mut self,
        meta: &EntityMeta,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        aggregates: bool,
    ) -> Result<()> {
        // NULL-safe rewrites: `x = NULL` means `x IS NULL` in every dialect
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            let negated = op == BinaryOp::Ne;
            if let Expr::Value(Value::Null) = rhs {
                self.expr(meta, lhs, aggregates)?;
                self.push(if negated { " IS NOT NULL" } else { " IS NULL" });
                return Ok(());
            }
            if let Expr::Value(Value::Null) = lhs {
                self.expr(meta, rhs, aggregates)?;
                self.push(if negated { " IS NOT NULL" } else { " IS NULL" });
                return Ok(());
            }
        }

        let (text, grouped) = match op {
            BinaryOp::Eq => (" = ", false),
            BinaryOp::Ne => (" <> ", false),
            BinaryOp::Lt => (" < ", false),
            BinaryOp::Le => (" <= ", false),
            BinaryOp::Gt => (" > ", false),
            BinaryOp::Ge => (" >= ", false),
            BinaryOp::And => (" AND ", true),
            BinaryOp::Or => (" OR ", true),
            BinaryOp::Add => (" + ", true),
            BinaryOp::Sub => (" - ", true),
            BinaryOp::Mul => (" * ", true),
            BinaryOp::Div => (" / ", true),
            BinaryOp::Rem => (" % ", true),
        };

        if grouped {
            self.push("(");
        }
        self.expr(meta, lhs, aggregates)?;
        self.push(text);
        self.expr(meta, rhs, aggregates)?;
        if grouped {
            self.push(")");
        }
        Ok(())
    }
}

/// Escape LIKE wildcards (and the escape character itself) in user input.
fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
