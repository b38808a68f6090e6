//! Trigger and step condition matching.

use companion_config::TriggerDef;

/// Whether every condition of a trigger holds for the payload.
///
/// A condition whose key is absent from the payload never matches.
pub(crate) fn trigger_matches(
  trigger: &TriggerDef,
  payload: &serde_json::Map<String, serde_json::Value>,
) -> bool {
  trigger.conditions.iter().all(|(key, expected)| {
    payload
      .get(key)
      .is_some_and(|actual| condition_holds(expected, actual))
  })
}

fn condition_holds(expected: &serde_json::Value, actual: &serde_json::Value) -> bool {
  match expected {
    serde_json::Value::Array(options) => {
      let haystack = stringify(actual).to_lowercase();
      options
        .iter()
        .any(|option| haystack.contains(&stringify(option).to_lowercase()))
    }
    serde_json::Value::String(s) => {
      if let Some(threshold) = s.strip_prefix('>') {
        compare(actual, threshold, |a, t| a > t)
      } else if let Some(threshold) = s.strip_prefix('<') {
        compare(actual, threshold, |a, t| a < t)
      } else {
        stringify(actual)
          .to_lowercase()
          .contains(&s.to_lowercase())
      }
    }
    other => other == actual,
  }
}

/// Whether every step condition holds.
///
/// A key present in the step output is checked there, with `>n` and `<n`
/// compared numerically and anything else compared for equality. Otherwise
/// the key must be in the context with an equal value. A key found in
/// neither fails.
pub(crate) fn step_conditions_hold(
  conditions: &serde_json::Map<String, serde_json::Value>,
  output: &serde_json::Map<String, serde_json::Value>,
  context: &serde_json::Map<String, serde_json::Value>,
) -> bool {
  conditions.iter().all(|(key, expected)| {
    if let Some(actual) = output.get(key) {
      match expected.as_str() {
        Some(s) if s.starts_with('>') => compare(actual, &s[1..], |a, t| a > t),
        Some(s) if s.starts_with('<') => compare(actual, &s[1..], |a, t| a < t),
        _ => expected == actual,
      }
    } else {
      context.get(key) == Some(expected)
    }
  })
}

fn compare(actual: &serde_json::Value, threshold: &str, op: fn(f64, f64) -> bool) -> bool {
  let Ok(threshold) = threshold.trim().parse::<f64>() else {
    return false;
  };
  let actual = match actual {
    serde_json::Value::Number(n) => n.as_f64(),
    serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  };
  actual.is_some_and(|a| op(a, threshold))
}

fn stringify(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}
