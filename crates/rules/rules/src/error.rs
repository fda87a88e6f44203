use thiserror::Error;

/// Errors that can occur while configuring an environment, compiling a rule,
/// or evaluating it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    /// The environment or one of its inputs is misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A document or expression could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The expression failed type checking against the declared surface.
    #[error("{}", .0.join("\n"))]
    Check(Vec<String>),

    /// A referenced variable was not supplied by the activation.
    #[error("no such attribute: {0}")]
    UndefinedVariable(String),

    /// A map lookup or field selection referenced a missing key.
    #[error("no such key: {0}")]
    NoSuchKey(String),

    /// No declared overload accepts the runtime argument types.
    #[error("no such overload: {function}({args})")]
    NoSuchOverload {
        /// The function or operator name.
        function: String,
        /// Runtime argument type names, comma separated.
        args: String,
    },

    /// A type mismatch discovered at runtime.
    #[error("type error: {0}")]
    TypeError(String),

    /// A general evaluation error that does not fit other categories.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// A custom function rejected its input.
    #[error("{0}")]
    Function(String),

    /// An invalid regular expression was supplied to a match operation.
    #[error("invalid regex: {0}")]
    InvalidRegex(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = RuleError::Configuration("unsupported schema version: 7".into());
        assert_eq!(
            err.to_string(),
            "configuration error: unsupported schema version: 7"
        );

        let err = RuleError::UndefinedVariable("request.method".into());
        assert_eq!(err.to_string(), "no such attribute: request.method");

        let err = RuleError::NoSuchKey("user-agent".into());
        assert_eq!(err.to_string(), "no such key: user-agent");

        let err = RuleError::NoSuchOverload {
            function: "_<_".into(),
            args: "string, int".into(),
        };
        assert_eq!(err.to_string(), "no such overload: _<_(string, int)");

        let err = RuleError::Function("invalid IP address: nope".into());
        assert_eq!(err.to_string(), "invalid IP address: nope");

        let err = RuleError::InvalidRegex("unclosed group".into());
        assert_eq!(err.to_string(), "invalid regex: unclosed group");
    }

    #[test]
    fn check_errors_join_on_newlines() {
        let err = RuleError::Check(vec![
            "undeclared reference to 'foo'".into(),
            "undeclared reference to 'bar'".into(),
        ]);
        assert_eq!(
            err.to_string(),
            "undeclared reference to 'foo'\nundeclared reference to 'bar'"
        );
    }
}
