//! Static Expression Evaluator for the Ruxy Pre-renderer
//!
//! Evaluates prop expressions at build time to produce concrete values.
//! Only the bindings of the supplied [`ScopeChain`] are visible: an identifier
//! that no layer declares makes the attempt fail with
//! [`EvalError::MissingBinding`], which the resolver answers by retrying the
//! node at its parent's scope.
//!
//! Nothing here executes user code. Calls and functions are reported as
//! [`EvalError::NotComputable`]. A runtime global such as `location` is
//! [`EvalError::RuntimeOnly`] until some enclosing scope declares the name.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrayExpressionElement, ChainElement, ComputedMemberExpression, Expression,
    ObjectPropertyKind, PropertyKey, PropertyKind, StaticMemberExpression, TemplateLiteral,
};
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::operator::{BinaryOperator, LogicalOperator, UnaryOperator};
use std::cmp::Ordering;

use crate::registry::PropValue;
use crate::scope::{ScopeChain, RUNTIME_GLOBALS};
use crate::value::{format_number, NotComputable, Segment, Value};

/// Bindings may be defined in terms of other bindings; this bounds the chain.
const MAX_BINDING_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("`{0}` is not declared in any scope supplied so far")]
    MissingBinding(String),
    #[error("`{0}` only exists at runtime")]
    RuntimeOnly(String),
    #[error("{0}")]
    NotComputable(String),
}

impl From<NotComputable> for EvalError {
    fn from(e: NotComputable) -> Self {
        EvalError::NotComputable(e.0)
    }
}

fn not_computable<T>(detail: impl Into<String>) -> Result<T, EvalError> {
    Err(EvalError::NotComputable(detail.into()))
}

/// Evaluates a prop or binding value. Literals and server values never touch
/// the parser.
pub fn eval_prop(value: &PropValue, scope: &ScopeChain<'_>) -> Result<Value, EvalError> {
    let mut active = Vec::new();
    eval_value(value, scope, &mut active)
}

/// Evaluates one expression source against `scope`.
pub fn static_eval(expr: &str, scope: &ScopeChain<'_>) -> Result<Value, EvalError> {
    let mut active = Vec::new();
    eval_source(expr, scope, &mut active)
}

fn eval_value(
    value: &PropValue,
    scope: &ScopeChain<'_>,
    active: &mut Vec<String>,
) -> Result<Value, EvalError> {
    match value {
        PropValue::Literal { value } => Ok(Value::from_json(value)),
        PropValue::ServerValue { slot } => Ok(Value::server_slot(slot.clone())),
        PropValue::ComponentLocal { expr } | PropValue::Unknown { expr } => {
            eval_source(expr, scope, active)
        }
    }
}

fn eval_source(
    source: &str,
    scope: &ScopeChain<'_>,
    active: &mut Vec<String>,
) -> Result<Value, EvalError> {
    let trimmed = source.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Ok(Value::Undefined);
    }

    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_typescript(true)
        .with_module(true)
        .with_jsx(true);

    let expr = match Parser::new(&allocator, trimmed, source_type).parse_expression() {
        Ok(expr) => expr,
        Err(errors) => {
            return not_computable(format!(
                "invalid expression syntax in `{}`: {:?}",
                trimmed,
                errors.first()
            ))
        }
    };

    let mut evaluator = Evaluator { scope, active };
    evaluator.eval(&expr)
}

struct Evaluator<'s, 'a> {
    scope: &'s ScopeChain<'a>,
    /// `owner#name` of bindings currently being evaluated.
    active: &'s mut Vec<String>,
}

impl Evaluator<'_, '_> {
    fn eval(&mut self, expr: &Expression<'_>) -> Result<Value, EvalError> {
        match expr {
            Expression::StringLiteral(lit) => Ok(Value::Str(lit.value.to_string())),
            Expression::NumericLiteral(lit) => Ok(Value::Number(lit.value)),
            Expression::BooleanLiteral(lit) => Ok(Value::Bool(lit.value)),
            Expression::NullLiteral(_) => Ok(Value::Null),
            Expression::Identifier(ident) => self.identifier(ident.name.as_str()),
            Expression::ParenthesizedExpression(paren) => self.eval(&paren.expression),
            Expression::TemplateLiteral(tpl) => self.template(tpl),
            Expression::StaticMemberExpression(member) => self.static_member(member),
            Expression::ComputedMemberExpression(member) => self.computed_member(member),
            Expression::ChainExpression(chain) => match &chain.expression {
                ChainElement::StaticMemberExpression(member) => self.static_member(member),
                ChainElement::ComputedMemberExpression(member) => self.computed_member(member),
                _ => not_computable("optional calls run only at runtime"),
            },
            Expression::UnaryExpression(unary) => {
                let argument = self.eval(&unary.argument)?;
                match unary.operator {
                    UnaryOperator::LogicalNot => Ok(Value::Bool(!argument.truthy()?)),
                    UnaryOperator::UnaryNegation => Ok(Value::Number(-argument.to_number()?)),
                    UnaryOperator::UnaryPlus => Ok(Value::Number(argument.to_number()?)),
                    UnaryOperator::Typeof => Ok(Value::Str(argument.type_of().to_string())),
                    UnaryOperator::Void => Ok(Value::Undefined),
                    op => not_computable(format!("unsupported unary operator `{}`", op.as_str())),
                }
            }
            Expression::BinaryExpression(binary) => {
                let left = self.eval(&binary.left)?;
                let right = self.eval(&binary.right)?;
                binary_op(binary.operator, &left, &right)
            }
            Expression::LogicalExpression(logical) => {
                let left = self.eval(&logical.left)?;
                let short_circuits = match logical.operator {
                    LogicalOperator::And => !left.truthy()?,
                    LogicalOperator::Or => left.truthy()?,
                    LogicalOperator::Coalesce => !left.is_nullish(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.eval(&logical.right)
                }
            }
            Expression::ConditionalExpression(cond) => {
                if self.eval(&cond.test)?.truthy()? {
                    self.eval(&cond.consequent)
                } else {
                    self.eval(&cond.alternate)
                }
            }
            Expression::ArrayExpression(array) => {
                let mut items = Vec::with_capacity(array.elements.len());
                for element in &array.elements {
                    match element {
                        ArrayExpressionElement::SpreadElement(_) => {
                            return not_computable("array spread is not supported at build time")
                        }
                        ArrayExpressionElement::Elision(_) => items.push(Value::Undefined),
                        other => match other.as_expression() {
                            Some(e) => items.push(self.eval(e)?),
                            None => return not_computable("unsupported array element"),
                        },
                    }
                }
                Ok(Value::Array(items))
            }
            Expression::ObjectExpression(object) => {
                let mut map = indexmap::IndexMap::new();
                for property in &object.properties {
                    let property = match property {
                        ObjectPropertyKind::ObjectProperty(p) => p,
                        ObjectPropertyKind::SpreadProperty(_) => {
                            return not_computable("object spread is not supported at build time")
                        }
                    };
                    if property.method || property.kind != PropertyKind::Init {
                        return not_computable("methods and accessors cannot be rendered");
                    }
                    let key = self.property_key(&property.key, property.computed)?;
                    let value = self.eval(&property.value)?;
                    map.insert(key, value);
                }
                Ok(Value::Object(map))
            }
            Expression::TSAsExpression(e) => self.eval(&e.expression),
            Expression::TSSatisfiesExpression(e) => self.eval(&e.expression),
            Expression::TSNonNullExpression(e) => self.eval(&e.expression),
            Expression::CallExpression(_) | Expression::NewExpression(_) => {
                not_computable("function calls run only at runtime")
            }
            Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) => {
                not_computable("functions cannot be rendered to markup")
            }
            Expression::JSXElement(_) | Expression::JSXFragment(_) => {
                not_computable("JSX in props is rendered by its own primitives")
            }
            _ => not_computable("expression kind is not supported at build time"),
        }
    }

    fn identifier(&mut self, name: &str) -> Result<Value, EvalError> {
        if let Some((index, binding)) = self.scope.lookup(name) {
            return self.binding(index, name, binding);
        }
        match name {
            "undefined" => Ok(Value::Undefined),
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ if RUNTIME_GLOBALS.contains(name) => Err(EvalError::RuntimeOnly(name.to_string())),
            _ => Err(EvalError::MissingBinding(name.to_string())),
        }
    }

    fn binding(&mut self, index: usize, name: &str, binding: &PropValue) -> Result<Value, EvalError> {
        let key = format!("{}#{}", self.scope.owner(index).unwrap_or_default(), name);
        if self.active.contains(&key) {
            return not_computable(format!("binding `{}` is defined in terms of itself", name));
        }
        if self.active.len() >= MAX_BINDING_DEPTH {
            return not_computable(format!("binding `{}` nests too deeply", name));
        }

        // A binding sees its declaring scope and the scopes around it.
        let outer = self.scope.from_layer(index);
        self.active.push(key);
        let result = eval_value(binding, &outer, self.active);
        self.active.pop();
        result
    }

    fn template(&mut self, tpl: &TemplateLiteral<'_>) -> Result<Value, EvalError> {
        let mut segments = Vec::new();
        for (i, quasi) in tpl.quasis.iter().enumerate() {
            let text = quasi.value.cooked.as_ref().unwrap_or(&quasi.value.raw);
            segments.push(Segment::Text(text.to_string()));
            if let Some(expr) = tpl.expressions.get(i) {
                segments.extend(self.eval(expr)?.to_segments());
            }
        }
        Ok(Value::from_segments(segments))
    }

    fn static_member(&mut self, member: &StaticMemberExpression<'_>) -> Result<Value, EvalError> {
        let object = self.eval(&member.object)?;
        if member.optional && object.is_nullish() {
            return Ok(Value::Undefined);
        }
        Ok(object.member(&Value::Str(member.property.name.to_string()))?)
    }

    fn computed_member(
        &mut self,
        member: &ComputedMemberExpression<'_>,
    ) -> Result<Value, EvalError> {
        let object = self.eval(&member.object)?;
        if member.optional && object.is_nullish() {
            return Ok(Value::Undefined);
        }
        let key = self.eval(&member.expression)?;
        Ok(object.member(&key)?)
    }

    fn property_key(&mut self, key: &PropertyKey<'_>, computed: bool) -> Result<String, EvalError> {
        if computed {
            return match key.as_expression() {
                Some(e) => Ok(self.eval(e)?.to_js_string()?),
                None => not_computable("unsupported computed key"),
            };
        }
        match key {
            PropertyKey::StaticIdentifier(id) => Ok(id.name.to_string()),
            PropertyKey::StringLiteral(s) => Ok(s.value.to_string()),
            PropertyKey::NumericLiteral(n) => Ok(format_number(n.value)),
            _ => not_computable("unsupported object key"),
        }
    }
}

fn binary_op(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let value = match op {
        BinaryOperator::Addition => left.add(right)?,
        BinaryOperator::Subtraction => Value::Number(left.to_number()? - right.to_number()?),
        BinaryOperator::Multiplication => Value::Number(left.to_number()? * right.to_number()?),
        BinaryOperator::Division => Value::Number(left.to_number()? / right.to_number()?),
        BinaryOperator::Remainder => Value::Number(left.to_number()? % right.to_number()?),
        BinaryOperator::Exponential => Value::Number(left.to_number()?.powf(right.to_number()?)),
        BinaryOperator::StrictEquality => Value::Bool(left.strict_equals(right)?),
        BinaryOperator::StrictInequality => Value::Bool(!left.strict_equals(right)?),
        BinaryOperator::Equality => Value::Bool(left.loose_equals(right)?),
        BinaryOperator::Inequality => Value::Bool(!left.loose_equals(right)?),
        BinaryOperator::LessThan => {
            Value::Bool(matches!(left.compare(right)?, Some(Ordering::Less)))
        }
        BinaryOperator::LessEqualThan => Value::Bool(matches!(
            left.compare(right)?,
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOperator::GreaterThan => {
            Value::Bool(matches!(left.compare(right)?, Some(Ordering::Greater)))
        }
        BinaryOperator::GreaterEqualThan => Value::Bool(matches!(
            left.compare(right)?,
            Some(Ordering::Greater | Ordering::Equal)
        )),
        other => {
            return not_computable(format!(
                "unsupported binary operator `{}`",
                other.as_str()
            ))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PrimitiveRecord;

    fn eval_in(record: &PrimitiveRecord, expr: &str) -> Result<Value, EvalError> {
        static_eval(expr, &ScopeChain::for_record(record))
    }

    fn text(s: &str) -> Value {
        Value::Str(s.to_string())
    }

    #[test]
    fn test_literals() {
        let record = PrimitiveRecord::new("n", "div");
        assert_eq!(eval_in(&record, "\"Hello\""), Ok(text("Hello")));
        assert_eq!(eval_in(&record, "'World'"), Ok(text("World")));
        assert_eq!(eval_in(&record, "42"), Ok(Value::Number(42.0)));
        assert_eq!(eval_in(&record, "null"), Ok(Value::Null));
        assert_eq!(eval_in(&record, "undefined"), Ok(Value::Undefined));
        assert_eq!(eval_in(&record, "  'x';  "), Ok(text("x")));
    }

    #[test]
    fn test_binding_resolution() {
        let record = PrimitiveRecord::new("n", "div")
            .with_binding("title", PropValue::literal("Home"))
            .with_binding("page", PropValue::local("{ title: title, index: 2 }"));

        assert_eq!(eval_in(&record, "title"), Ok(text("Home")));
        assert_eq!(eval_in(&record, "page.title"), Ok(text("Home")));
        assert_eq!(eval_in(&record, "page['index'] * 2"), Ok(Value::Number(4.0)));
    }

    #[test]
    fn test_concatenation_and_template_literal() {
        let record = PrimitiveRecord::new("n", "div").with_binding("title", PropValue::literal("Home"));

        assert_eq!(eval_in(&record, "\"Ruxy | \" + title"), Ok(text("Ruxy | Home")));
        assert_eq!(eval_in(&record, "`Ruxy | ${title}`"), Ok(text("Ruxy | Home")));
        assert_eq!(eval_in(&record, "`${1 + 1}px`"), Ok(text("2px")));
    }

    #[test]
    fn test_ternary_and_logical() {
        let record = PrimitiveRecord::new("n", "div")
            .with_binding("count", PropValue::literal(3))
            .with_binding("label", PropValue::literal(serde_json::Value::Null));

        assert_eq!(eval_in(&record, "true ? 'Yes' : 'No'"), Ok(text("Yes")));
        assert_eq!(eval_in(&record, "count > 5 ? 'many' : 'few'"), Ok(text("few")));
        assert_eq!(eval_in(&record, "label ?? 'fallback'"), Ok(text("fallback")));
        assert_eq!(eval_in(&record, "count === 3 && 'three'"), Ok(text("three")));
        assert_eq!(eval_in(&record, "!count"), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_short_circuit_skips_missing_binding() {
        let record = PrimitiveRecord::new("n", "div").with_binding("enabled", PropValue::literal(false));
        assert_eq!(eval_in(&record, "enabled && notDeclared"), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_missing_binding() {
        let record = PrimitiveRecord::new("n", "div");
        assert_eq!(
            eval_in(&record, "greeting + '!'"),
            Err(EvalError::MissingBinding("greeting".to_string()))
        );
    }

    #[test]
    fn test_outer_scope_supplies_binding() {
        let parent = PrimitiveRecord::new("parent", "div").with_binding("greeting", PropValue::literal("hi"));
        let child = PrimitiveRecord::new("child", "span").with_parent("parent");

        let mut chain = ScopeChain::for_record(&child);
        assert!(static_eval("greeting", &chain).is_err());
        chain.push_outer(&parent);
        assert_eq!(static_eval("greeting", &chain), Ok(text("hi")));
    }

    #[test]
    fn test_binding_expression_sees_only_its_own_and_outer_scopes() {
        // `label` is declared by the parent in terms of `name`; the child's own
        // `name` must not leak into it.
        let parent = PrimitiveRecord::new("parent", "div")
            .with_binding("name", PropValue::literal("outer"))
            .with_binding("label", PropValue::local("`[${name}]`"));
        let child = PrimitiveRecord::new("child", "span")
            .with_parent("parent")
            .with_binding("name", PropValue::literal("inner"));

        let mut chain = ScopeChain::for_record(&child);
        chain.push_outer(&parent);
        assert_eq!(static_eval("label + name", &chain), Ok(text("[outer]inner")));
    }

    #[test]
    fn test_server_values_flow_through_text() {
        let record = PrimitiveRecord::new("n", "div").with_binding("message", PropValue::server("message"));

        assert_eq!(
            eval_in(&record, "`${message}!`"),
            Ok(Value::Server(vec![
                Segment::Slot("message".to_string()),
                Segment::Text("!".to_string()),
            ]))
        );
        assert!(matches!(
            eval_in(&record, "message ? 'a' : 'b'"),
            Err(EvalError::NotComputable(_))
        ));
    }

    #[test]
    fn test_runtime_only_constructs() {
        let record = PrimitiveRecord::new("n", "div").with_binding("text", PropValue::literal("x"));

        assert!(matches!(eval_in(&record, "text.toUpperCase()"), Err(EvalError::NotComputable(_))));
        assert_eq!(
            eval_in(&record, "window.innerWidth"),
            Err(EvalError::RuntimeOnly("window".to_string()))
        );
        assert!(matches!(eval_in(&record, "() => 1"), Err(EvalError::NotComputable(_))));
        assert!(matches!(eval_in(&record, "a +* b"), Err(EvalError::NotComputable(_))));
    }

    #[test]
    fn test_declared_name_shadows_runtime_global() {
        let record = PrimitiveRecord::new("n", "div").with_binding("location", PropValue::literal("Paris"));
        assert_eq!(eval_in(&record, "`in ${location}`"), Ok(text("in Paris")));
    }

    #[test]
    fn test_cyclic_bindings() {
        let record = PrimitiveRecord::new("n", "div")
            .with_binding("a", PropValue::local("b + 1"))
            .with_binding("b", PropValue::local("a + 1"));
        assert!(matches!(eval_in(&record, "a"), Err(EvalError::NotComputable(_))));
    }

    #[test]
    fn test_style_object() {
        let record = PrimitiveRecord::new("n", "div").with_binding("gap", PropValue::literal(16));
        let value = eval_in(&record, "{ display: 'flex', gap }").unwrap();
        match value {
            Value::Object(map) => {
                assert_eq!(map.get("display"), Some(&text("flex")));
                assert_eq!(map.get("gap"), Some(&Value::Number(16.0)));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }
}
