use serde_json::Value;

const SEPARATOR: &str = " · ";

/// Finite, non-negative number or nothing.
fn count(metrics: &Value, key: &str) -> Option<f64> {
    metrics
        .get(key)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && *n >= 0.0)
}

fn positive(metrics: &Value, key: &str) -> Option<f64> {
    count(metrics, key).filter(|n| *n > 0.0)
}

fn id_count(metrics: &Value, key: &str) -> usize {
    metrics.get(key).and_then(Value::as_array).map_or(0, Vec::len)
}

fn number(n: f64) -> String {
    if n.fract() == 0.0 && n < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// One-line summary of a memory pack injection.
///
/// Avoided work is shown only with a breakdown where known items are
/// positive and at least as many as unknown ones. The delta appears only
/// when the pack reports one.
pub fn build_injection_toast_message(metrics: Option<&Value>) -> String {
    let mut parts = vec!["codemem injected".to_string()];
    let Some(metrics) = metrics.filter(|m| m.is_object()) else {
        return parts.join(SEPARATOR);
    };

    if let Some(items) = positive(metrics, "items") {
        parts.push(format!("{} items", number(items)));
    }
    if let Some(tokens) = positive(metrics, "pack_tokens") {
        parts.push(format!("~{} tokens", number(tokens)));
    }

    let known = count(metrics, "avoided_work_known_items").unwrap_or(0.0);
    let unknown = count(metrics, "avoided_work_unknown_items").unwrap_or(0.0);
    if let Some(avoided) = positive(metrics, "avoided_work_tokens") {
        if known > 0.0 && known >= unknown {
            parts.push(format!("avoided work ~{} tokens", number(avoided)));
        }
    }

    if metrics.get("pack_delta_available").and_then(Value::as_bool) == Some(true) {
        parts.push(format!(
            "delta +{}/-{}",
            id_count(metrics, "added_ids"),
            id_count(metrics, "removed_ids")
        ));
    }

    parts.join(SEPARATOR)
}
