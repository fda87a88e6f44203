use serde::{Deserialize, Serialize};

use super::operators;

/// Unary operators supported in rule expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Logical negation (`!expr`).
    Not,
    /// Arithmetic negation (`-expr`).
    Neg,
}

impl UnaryOp {
    /// The function name this operator dispatches to.
    pub fn function_name(self) -> &'static str {
        match self {
            Self::Not => operators::LOGICAL_NOT,
            Self::Neg => operators::NEGATE,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Neg => "-",
        }
    }
}

/// Binary operators supported in rule expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    /// Addition or string concatenation.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Modulo.
    Mod,

    // Relations
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Membership test (`key in map`).
    In,

    // Logical
    /// Logical AND.
    And,
    /// Logical OR.
    Or,
}

impl BinaryOp {
    /// The function name this operator dispatches to.
    pub fn function_name(self) -> &'static str {
        match self {
            Self::Add => operators::ADD,
            Self::Sub => operators::SUBTRACT,
            Self::Mul => operators::MULTIPLY,
            Self::Div => operators::DIVIDE,
            Self::Mod => operators::MODULO,
            Self::Eq => operators::EQUALS,
            Self::Ne => operators::NOT_EQUALS,
            Self::Lt => operators::LESS,
            Self::Le => operators::LESS_EQUALS,
            Self::Gt => operators::GREATER,
            Self::Ge => operators::GREATER_EQUALS,
            Self::In => operators::IN,
            Self::And => operators::LOGICAL_AND,
            Self::Or => operators::LOGICAL_OR,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// The expression tree for rule conditions.
///
/// The parser produces this tree, macros rewrite it, the checker resolves
/// qualified identifiers in it, and the evaluator walks it against an
/// activation. It is serializable so checked rules can be inspected as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// The null literal.
    Null,
    /// A boolean literal.
    Bool(bool),
    /// A 64-bit signed integer literal.
    Int(i64),
    /// A 64-bit floating-point literal.
    Float(f64),
    /// A string literal.
    String(String),
    /// A list of expressions.
    List(Vec<Expr>),
    /// A map of string keys to expressions.
    Map(Vec<(String, Expr)>),
    /// A variable reference. After checking this holds the full dotted
    /// attribute name, e.g. `request.method`.
    Ident(String),
    /// Field selection: `expr.field`.
    Field(Box<Expr>, String),
    /// Index access: `expr[index]`.
    Index(Box<Expr>, Box<Expr>),
    /// Presence test produced by the `has` macro: is `field` set on `expr`?
    Presence(Box<Expr>, String),
    /// A unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// A binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// A conditional expression: `condition ? then : else`.
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// A function call, either global (`f(args)`) or receiver-style
    /// (`target.f(args)`).
    Call {
        /// Function name.
        function: String,
        /// Receiver for member-style calls.
        target: Option<Box<Expr>>,
        /// Call arguments, excluding the receiver.
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Build a global function call.
    pub fn call(function: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Call {
            function: function.into(),
            target: None,
            args,
        }
    }

    /// Build a receiver-style function call.
    pub fn member_call(target: Self, function: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Call {
            function: function.into(),
            target: Some(Box::new(target)),
            args,
        }
    }

    /// Returns the expression rendered in rule-language syntax.
    pub fn to_source(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => format!("{f:?}"),
            Self::String(s) => quote(s),
            Self::List(items) => {
                let inner = items
                    .iter()
                    .map(Self::to_source)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{inner}]")
            }
            Self::Map(entries) => {
                let inner = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote(k), v.to_source()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{inner}}}")
            }
            Self::Ident(name) => name.clone(),
            Self::Field(base, field) => format!("{}.{}", base.to_source(), field_source(field)),
            Self::Index(base, index) => format!("{}[{}]", base.to_source(), index.to_source()),
            Self::Presence(base, field) => {
                format!("has({}.{})", base.to_source(), field_source(field))
            }
            Self::Unary(op, expr) => format!("{}{}", op.symbol(), expr.to_source()),
            Self::Binary(op, lhs, rhs) => {
                format!("({} {} {})", lhs.to_source(), op.symbol(), rhs.to_source())
            }
            Self::Ternary(cond, then, els) => format!(
                "({} ? {} : {})",
                cond.to_source(),
                then.to_source(),
                els.to_source()
            ),
            Self::Call {
                function,
                target,
                args,
            } => {
                let inner = args
                    .iter()
                    .map(Self::to_source)
                    .collect::<Vec<_>>()
                    .join(", ");
                match target {
                    Some(t) => format!("{}.{function}({inner})", t.to_source()),
                    None => format!("{function}({inner})"),
                }
            }
        }
    }

    /// Returns `true` if this expression is a constant (literal) value.
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::String(_)
        )
    }

    /// Returns the dotted name of an identifier or a chain of field
    /// selections rooted at an identifier, e.g. `origin.ip`.
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            Self::Ident(name) => Some(name.clone()),
            Self::Field(base, field) => base.qualified_name().map(|q| format!("{q}.{field}")),
            _ => None,
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

fn field_source(field: &str) -> String {
    let plain = field
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        field.to_owned()
    } else {
        format!("`{field}`")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.into())
    }

    #[test]
    fn is_constant() {
        assert!(Expr::Null.is_constant());
        assert!(Expr::Bool(true).is_constant());
        assert!(Expr::Int(42).is_constant());
        assert!(Expr::Float(0.5).is_constant());
        assert!(Expr::String("hello".into()).is_constant());
        assert!(!ident("x").is_constant());
        assert!(!Expr::List(vec![Expr::Int(1)]).is_constant());
    }

    #[test]
    fn qualified_name_of_select_chain() {
        let expr = Expr::Field(
            Box::new(Expr::Field(Box::new(ident("token")), "recaptcha_action".into())),
            "score".into(),
        );
        assert_eq!(
            expr.qualified_name().as_deref(),
            Some("token.recaptcha_action.score")
        );

        let indexed = Expr::Field(
            Box::new(Expr::Index(
                Box::new(ident("request")),
                Box::new(Expr::String("a".into())),
            )),
            "b".into(),
        );
        assert_eq!(indexed.qualified_name(), None);
    }

    #[test]
    fn to_source_renders_rule_syntax() {
        let expr = Expr::Binary(
            BinaryOp::And,
            Box::new(Expr::Binary(
                BinaryOp::Eq,
                Box::new(Expr::member_call(
                    Expr::Field(Box::new(ident("request")), "method".into()),
                    "lower",
                    vec![],
                )),
                Box::new(Expr::String("get".into())),
            )),
            Box::new(Expr::call(
                "inIpRange",
                vec![ident("origin.ip"), Expr::String("10.0.0.0/8".into())],
            )),
        );
        assert_eq!(
            expr.to_source(),
            "((request.method.lower() == 'get') && inIpRange(origin.ip, '10.0.0.0/8'))"
        );
    }

    #[test]
    fn to_source_quotes_odd_fields_and_strings() {
        let expr = Expr::Presence(
            Box::new(Expr::Field(Box::new(ident("request.params")), "key-one".into())),
            "it's".into(),
        );
        assert_eq!(expr.to_source(), "has(request.params.`key-one`.`it's`)");
        assert_eq!(Expr::String("it's\n".into()).to_source(), r"'it\'s\n'");
        assert_eq!(Expr::Float(1.0).to_source(), "1.0");
    }

    #[test]
    fn operator_function_names() {
        assert_eq!(BinaryOp::Eq.function_name(), "_==_");
        assert_eq!(BinaryOp::In.function_name(), "@in");
        assert_eq!(UnaryOp::Not.function_name(), "!_");
        assert!(operators::is_operator(BinaryOp::Mod.function_name()));
        assert!(!operators::is_operator("inIpRange"));
    }

    #[test]
    fn expr_serde_roundtrip() {
        let expr = Expr::Presence(
            Box::new(ident("request.headers")),
            "user-agent".into(),
        );
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }
}
