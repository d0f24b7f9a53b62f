//! 候选答案类型与规范化
//!
//! 所有策略的原始文本结果都经过同一个 `extract_answer` 提取步骤，
//! 得到一个封闭的带标签联合类型；提交前再由 `format_answer`
//! 规范化为提交字符串。两者都是纯函数。

use serde_json::Value as JsonValue;

/// `answer` 字段递归解包的最大深度
///
/// 超过该深度后停止解包，剩余结构按压缩 JSON 序列化输出。
const MAX_ANSWER_UNWRAP_DEPTH: usize = 5;

/// 策略执行产出的候选答案
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerCandidate {
    /// 无答案
    Null,
    /// 布尔答案
    Bool(bool),
    /// 数字答案
    Number(f64),
    /// 文本答案（含 data: URI）
    Text(String),
    /// 结构化答案
    Json(JsonValue),
}

/// 从后端原始文本中提取类型化答案
///
/// 规则按顺序应用：去除首尾空白；等于 true/false（忽略大小写）则为布尔；
/// 是数字字面量则为数字；是 JSON 对象/数组则解析为结构化值；
/// 其余（含 data: URI）保持为文本。
pub fn extract_answer(raw: &str) -> AnswerCandidate {
    let cleaned = raw.trim();

    if cleaned.eq_ignore_ascii_case("true") {
        return AnswerCandidate::Bool(true);
    }
    if cleaned.eq_ignore_ascii_case("false") {
        return AnswerCandidate::Bool(false);
    }

    if is_numeric_literal(cleaned) {
        if let Ok(n) = cleaned.parse::<f64>() {
            return AnswerCandidate::Number(n);
        }
    }

    if (cleaned.starts_with('{') && cleaned.ends_with('}'))
        || (cleaned.starts_with('[') && cleaned.ends_with(']'))
    {
        if let Ok(value) = serde_json::from_str::<JsonValue>(cleaned) {
            return AnswerCandidate::Json(value);
        }
    }

    AnswerCandidate::Text(cleaned.to_string())
}

/// 将候选答案规范化为提交字符串
///
/// 总函数，永不失败。
pub fn format_answer(candidate: &AnswerCandidate) -> String {
    match candidate {
        AnswerCandidate::Null => String::new(),
        AnswerCandidate::Bool(b) => b.to_string(),
        AnswerCandidate::Number(n) => n.to_string(),
        AnswerCandidate::Text(s) => s.clone(),
        AnswerCandidate::Json(value) => format_json_value(value, 0),
    }
}

/// 格式化结构化值，带 `answer` 字段解包
fn format_json_value(value: &JsonValue, depth: usize) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Object(map) => {
            if depth < MAX_ANSWER_UNWRAP_DEPTH {
                if let Some(inner) = map.get("answer") {
                    return format_json_value(inner, depth + 1);
                }
            }
            serde_json::to_string(value).unwrap_or_default()
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// 是否为数字字面量（可选负号、整数部分、可选小数部分）
fn is_numeric_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() {
        return false;
    }
    let mut parts = digits.splitn(2, '.');
    let integer = parts.next().unwrap_or("");
    let fraction = parts.next();
    if integer.is_empty() || !integer.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    match fraction {
        None => true,
        Some(frac) => frac.chars().all(|c| c.is_ascii_digit()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_boolean() {
        assert_eq!(extract_answer("true"), AnswerCandidate::Bool(true));
        assert_eq!(extract_answer("FALSE"), AnswerCandidate::Bool(false));
        assert_eq!(extract_answer("  True  "), AnswerCandidate::Bool(true));
    }

    #[test]
    fn test_extract_number() {
        assert_eq!(extract_answer("42"), AnswerCandidate::Number(42.0));
        assert_eq!(extract_answer("-3.14"), AnswerCandidate::Number(-3.14));
        assert_eq!(extract_answer("5."), AnswerCandidate::Number(5.0));
        // 带文字的数字不是数字字面量
        assert_eq!(
            extract_answer("42 apples"),
            AnswerCandidate::Text("42 apples".to_string())
        );
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(
            extract_answer(r#"{"a": 1}"#),
            AnswerCandidate::Json(json!({"a": 1}))
        );
        assert_eq!(
            extract_answer("[1, 2, 3]"),
            AnswerCandidate::Json(json!([1, 2, 3]))
        );
        // 非法 JSON 保持为文本
        assert_eq!(
            extract_answer("{broken"),
            AnswerCandidate::Text("{broken".to_string())
        );
    }

    #[test]
    fn test_extract_data_uri() {
        let uri = "data:image/png;base64,iVBORw0KGgo=";
        assert_eq!(extract_answer(uri), AnswerCandidate::Text(uri.to_string()));
    }

    #[test]
    fn test_format_scalars() {
        assert_eq!(format_answer(&AnswerCandidate::Null), "");
        assert_eq!(format_answer(&AnswerCandidate::Bool(true)), "true");
        assert_eq!(format_answer(&AnswerCandidate::Bool(false)), "false");
        assert_eq!(format_answer(&AnswerCandidate::Number(3.5)), "3.5");
        // 整数值不带小数点
        assert_eq!(format_answer(&AnswerCandidate::Number(30.0)), "30");
        assert_eq!(
            format_answer(&AnswerCandidate::Text("hello".to_string())),
            "hello"
        );
    }

    #[test]
    fn test_format_answer_field_unwrap() {
        assert_eq!(
            format_answer(&AnswerCandidate::Json(json!({"answer": 7}))),
            "7"
        );
        assert_eq!(
            format_answer(&AnswerCandidate::Json(json!({"answer": {"answer": "x"}}))),
            "x"
        );
    }

    #[test]
    fn test_format_json_minified() {
        assert_eq!(
            format_answer(&AnswerCandidate::Json(json!({"a": 1, "b": 2}))),
            r#"{"a":1,"b":2}"#
        );
    }

    #[test]
    fn test_format_unwrap_depth_bounded() {
        // 嵌套 6 层 answer：第 5 层停止解包，剩余结构按 JSON 输出
        let mut value = json!({"answer": 1});
        for _ in 0..5 {
            value = json!({ "answer": value });
        }
        let formatted = format_answer(&AnswerCandidate::Json(value));
        assert_eq!(formatted, r#"{"answer":1}"#);
    }
}
