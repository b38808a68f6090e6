//! Parameter interpolation using minijinja templates.
//!
//! Step parameters are rendered against an execution context built from the
//! trigger payload and the outputs of earlier steps. Placeholders use single
//! braces:
//!
//! ```json
//! { "dir": "{target_dir}", "content": "Stored {organize.results | length} results" }
//! ```
//!
//! # Rules
//! - A placeholder is a name followed by `.field` or `[index]` segments,
//!   optionally piped through one of a few argument-free filters. Any other
//!   use of `{` is malformed and never rendered.
//! - Strings without `{` and non-string scalars pass through unchanged.
//! - Objects and arrays are walked recursively.
//! - Numbers and booleans render in canonical form (`5`, `2.5`, `true`),
//!   null renders as `null`, and objects or arrays render as compact JSON.
//! - A placeholder with no value in the context is an error. Nothing is ever
//!   replaced with an empty string.
//!
//! Rendering is pure: the environment is built per call and the result
//! depends only on the template and the context.

use std::collections::BTreeSet;

use minijinja::syntax::SyntaxConfig;
use minijinja::value::ValueKind;
use minijinja::{Environment, ErrorKind, Output, State, UndefinedBehavior, Value, escape_formatter};

use crate::error::InterpolationError;

/// Values available to placeholders.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Filters a placeholder may apply. None of them take arguments.
const FILTERS: &[&str] = &[
  "length",
  "lower",
  "upper",
  "title",
  "capitalize",
  "trim",
  "first",
  "last",
];

/// Names the expression language reserves for literals and operators.
const RESERVED: &[&str] = &[
  "true", "false", "none", "True", "False", "None", "and", "or", "not", "in", "is", "if", "else",
];

/// Build the environment used for every render.
fn environment<'source>() -> Result<Environment<'source>, InterpolationError> {
  let syntax = SyntaxConfig::builder()
    .block_delimiters("{%", "%}")
    .variable_delimiters("{", "}")
    .comment_delimiters("{#", "#}")
    .build()
    .map_err(|e| InterpolationError::Malformed {
      key: String::new(),
      message: format!("invalid placeholder syntax: {}", e),
    })?;

  let mut env = Environment::new();
  env.set_syntax(syntax);
  env.set_undefined_behavior(UndefinedBehavior::Strict);
  env.set_keep_trailing_newline(true);
  env.set_formatter(format_value);
  Ok(env)
}

fn format_value(
  out: &mut Output<'_>,
  state: &State<'_, '_>,
  value: &Value,
) -> Result<(), minijinja::Error> {
  match value.kind() {
    ValueKind::Bool => write(out, if value.is_true() { "true" } else { "false" }),
    ValueKind::None => write(out, "null"),
    ValueKind::Seq | ValueKind::Map => {
      let json = serde_json::to_string(value)
        .map_err(|e| minijinja::Error::new(ErrorKind::BadSerialization, e.to_string()))?;
      write(out, &json)
    }
    _ => escape_formatter(out, state, value),
  }
}

fn write(out: &mut Output<'_>, s: &str) -> Result<(), minijinja::Error> {
  out
    .write_str(s)
    .map_err(|_| minijinja::Error::from(ErrorKind::WriteFailure))
}

/// Scan a string for placeholders and return their top-level names in
/// order of appearance.
fn scan(template: &str) -> Result<Vec<&str>, String> {
  let mut roots = Vec::new();
  let mut rest = template;
  while let Some(open) = rest.find('{') {
    let after = &rest[open + 1..];
    let Some(close) = after.find('}') else {
      return Err(format!("unclosed placeholder in '{}'", template));
    };
    let expr = &after[..close];
    let root = parse_expression(expr).ok_or_else(|| {
      format!(
        "'{{{}}}' is not a placeholder; expected {{name}}, {{name.field}} or {{name | filter}}",
        expr
      )
    })?;
    roots.push(root);
    rest = &after[close + 1..];
  }
  Ok(roots)
}

fn parse_expression(expr: &str) -> Option<&str> {
  let mut parts = expr.split('|');
  let root = parse_path(parts.next()?.trim())?;
  for filter in parts {
    if !FILTERS.contains(&filter.trim()) {
      return None;
    }
  }
  Some(root)
}

fn parse_path(path: &str) -> Option<&str> {
  let root_len = ident_len(path)?;
  let root = &path[..root_len];
  if RESERVED.contains(&root) {
    return None;
  }

  let mut rest = &path[root_len..];
  while !rest.is_empty() {
    if let Some(field) = rest.strip_prefix('.') {
      rest = &field[ident_len(field)?..];
    } else if let Some(index) = rest.strip_prefix('[') {
      let close = index.find(']')?;
      if close == 0 || !index[..close].bytes().all(|b| b.is_ascii_digit()) {
        return None;
      }
      rest = &index[close + 1..];
    } else {
      return None;
    }
  }
  Some(root)
}

fn ident_len(s: &str) -> Option<usize> {
  let mut chars = s.char_indices();
  match chars.next() {
    Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return None,
  }
  Some(
    chars
      .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
      .map_or(s.len(), |(i, _)| i),
  )
}

fn scan_at<'s>(path: &str, template: &'s str) -> Result<Vec<&'s str>, InterpolationError> {
  scan(template).map_err(|message| InterpolationError::Malformed {
    key: path.to_string(),
    message,
  })
}

/// Render every value of a parameter map against a context.
pub fn render<'p>(
  params: &'p serde_json::Map<String, serde_json::Value>,
  context: &Context,
) -> Result<serde_json::Map<String, serde_json::Value>, InterpolationError> {
  let env: Environment<'p> = environment()?;
  let ctx = Value::from_serialize(context);

  let mut rendered = serde_json::Map::with_capacity(params.len());
  for (key, value) in params {
    rendered.insert(key.clone(), render_value(&env, key, value, &ctx, context)?);
  }
  Ok(rendered)
}

/// Render a single template string.
pub fn render_str(template: &str, context: &Context) -> Result<String, InterpolationError> {
  let env = environment()?;
  render_template(&env, "", template, &Value::from_serialize(context), context)
}

fn render_value<'p>(
  env: &Environment<'p>,
  path: &str,
  value: &'p serde_json::Value,
  ctx: &Value,
  context: &Context,
) -> Result<serde_json::Value, InterpolationError> {
  match value {
    serde_json::Value::String(s) => Ok(serde_json::Value::String(render_template(
      env, path, s, ctx, context,
    )?)),
    serde_json::Value::Array(items) => items
      .iter()
      .enumerate()
      .map(|(i, item)| render_value(env, &format!("{}[{}]", path, i), item, ctx, context))
      .collect::<Result<Vec<_>, _>>()
      .map(serde_json::Value::Array),
    serde_json::Value::Object(map) => {
      let mut rendered = serde_json::Map::with_capacity(map.len());
      for (key, item) in map {
        let item_path = format!("{}.{}", path, key);
        rendered.insert(key.clone(), render_value(env, &item_path, item, ctx, context)?);
      }
      Ok(serde_json::Value::Object(rendered))
    }
    other => Ok(other.clone()),
  }
}

fn render_template<'p>(
  env: &Environment<'p>,
  path: &str,
  template: &'p str,
  ctx: &Value,
  context: &Context,
) -> Result<String, InterpolationError> {
  let roots = scan_at(path, template)?;
  if roots.is_empty() {
    return Ok(template.to_string());
  }

  env.render_str(template, ctx.clone()).map_err(|e| match e.kind() {
    ErrorKind::UndefinedError => InterpolationError::Unresolved {
      key: path.to_string(),
      missing: roots
        .iter()
        .filter(|name| !context.contains_key(**name))
        .map(|name| name.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect(),
      message: e.to_string(),
    },
    ErrorKind::SyntaxError | ErrorKind::UnknownFilter | ErrorKind::UnknownFunction => {
      InterpolationError::Malformed {
        key: path.to_string(),
        message: e.to_string(),
      }
    }
    _ => InterpolationError::Unresolved {
      key: path.to_string(),
      missing: Vec::new(),
      message: e.to_string(),
    },
  })
}

/// Top-level names referenced by a template string.
///
/// Fails on anything that is not a well-formed placeholder, which lets
/// templates be rejected at load time instead of mid-execution.
pub fn placeholders(template: &str) -> Result<BTreeSet<String>, InterpolationError> {
  Ok(
    scan_at("", template)?
      .into_iter()
      .map(str::to_string)
      .collect(),
  )
}

/// Check that a template string is well formed without rendering it.
pub fn validate(template: &str) -> Result<(), InterpolationError> {
  scan_at("", template).map(|_| ())
}

/// Check every template string in a parameter map and collect the names
/// they reference.
pub fn param_placeholders(
  params: &serde_json::Map<String, serde_json::Value>,
) -> Result<BTreeSet<String>, InterpolationError> {
  let mut names = BTreeSet::new();
  for (key, value) in params {
    walk_placeholders(key, value, &mut names)?;
  }
  Ok(names)
}

fn walk_placeholders(
  path: &str,
  value: &serde_json::Value,
  names: &mut BTreeSet<String>,
) -> Result<(), InterpolationError> {
  match value {
    serde_json::Value::String(s) => {
      names.extend(scan_at(path, s)?.into_iter().map(str::to_string));
    }
    serde_json::Value::Array(items) => {
      for (i, item) in items.iter().enumerate() {
        walk_placeholders(&format!("{}[{}]", path, i), item, names)?;
      }
    }
    serde_json::Value::Object(map) => {
      for (key, item) in map {
        walk_placeholders(&format!("{}.{}", path, key), item, names)?;
      }
    }
    _ => {}
  }
  Ok(())
}
