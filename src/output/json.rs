use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

/// Pretty-print any serializable value as JSON to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Serialize `value` and add the page the caller should go to next.
/// Non-object values are wrapped as `{"result": ..., "redirect": ...}`.
pub fn with_redirect<T: Serialize>(value: &T, redirect: &str) -> Result<Value> {
    let mut json = serde_json::to_value(value)?;
    match json {
        Value::Object(ref mut map) => {
            map.insert("redirect".into(), Value::String(redirect.to_string()));
            Ok(json)
        }
        other => Ok(serde_json::json!({ "result": other, "redirect": redirect })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_redirect() {
        let obj = with_redirect(&serde_json::json!({ "id": 4 }), "/user_home").unwrap();
        assert_eq!(obj["id"], 4);
        assert_eq!(obj["redirect"], "/user_home");

        let list = with_redirect(&vec![1, 2], "/upload/add_page").unwrap();
        assert_eq!(list["result"], serde_json::json!([1, 2]));
        assert_eq!(list["redirect"], "/upload/add_page");
    }
}
