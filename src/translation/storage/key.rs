//! 缓存键生成

use sha2::{Digest, Sha256};

/// 由原文和模型生成内容寻址的缓存键
///
/// 对 `source_text + ":" + model` 的 UTF-8 字节做 SHA-256，返回 64 位十六进制字符串。
pub fn derive_key(source_text: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_text.as_bytes());
    hasher.update(b":");
    hasher.update(model.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_key() {
        assert_eq!(
            derive_key("Hello world", "model-a"),
            derive_key("Hello world", "model-a")
        );
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = derive_key("# Title\n\nBody", "LongCat-Flash-Chat-2512");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn models_do_not_collide() {
        let texts = ["", "Hello", "## Section\n\ntext", "你好，世界"];
        let models = ["mock-model", "real-model", "LongCat-Flash-Chat-2512", ""];

        let mut seen = std::collections::HashSet::new();
        for text in texts {
            for model in models {
                assert!(
                    seen.insert(derive_key(text, model)),
                    "collision for ({:?}, {:?})",
                    text,
                    model
                );
            }
        }
    }
}
