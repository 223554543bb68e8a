//! 通用工具函数

use regex::Regex;
use std::sync::OnceLock;

/// 计算总页数：`ceil(total / per_page)`
pub fn total_pages(total: u64, per_page: u32) -> u32 {
    if per_page == 0 {
        return 0;
    }
    let per_page = u64::from(per_page);
    let pages = (total + per_page - 1) / per_page;
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// 将页码限制在 `[1, total_pages]` 内（空列表时为 1）
pub fn clamp_page(page: u32, total_pages: u32) -> u32 {
    page.clamp(1, total_pages.max(1))
}

/// MIME 类型是否属于图片
pub fn is_image_mime(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}

/// 粗略的邮箱格式检查（真正的校验由服务端完成）
pub fn is_plausible_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    let pattern = EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    });
    pattern.is_match(email.trim())
}

/// 百分比，保留一位小数；分母为 0 时返回 0
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1(part as f64 * 100.0 / whole as f64)
}

/// 保留一位小数
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// 时间戳解析：兼容 RFC 3339 与不带时区的 ISO-8601（按 UTC 处理）
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            match raw {
                None => Ok(None),
                Some(s) if s.trim().is_empty() => Ok(None),
                Some(s) => super::parse(&s)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", s))),
            }
        }
    }
}

/// 数值解析：服务端的 Numeric 字段可能以字符串形式返回
pub mod number {
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(0.0),
            Some(Raw::Number(n)) => Ok(n),
            Some(Raw::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| de::Error::custom(format!("invalid number: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(101, 50), 3);
        assert_eq!(total_pages(5, 0), 0);
    }

    #[test]
    fn test_clamp_page() {
        assert_eq!(clamp_page(0, 3), 1);
        assert_eq!(clamp_page(5, 3), 3);
        assert_eq!(clamp_page(2, 3), 2);
        assert_eq!(clamp_page(4, 0), 1);
    }

    #[test]
    fn test_is_image_mime() {
        assert!(is_image_mime("image/png"));
        assert!(is_image_mime("IMAGE/JPEG"));
        assert!(!is_image_mime("application/pdf"));
        assert!(!is_image_mime(""));
    }

    #[test]
    fn test_is_plausible_email() {
        assert!(is_plausible_email("juan@hospital.com"));
        assert!(!is_plausible_email("juan@hospital"));
        assert!(!is_plausible_email("juan hospital.com"));
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn test_timestamp_parse_variants() {
        assert!(timestamp::parse("2024-10-30T12:00:00Z").is_some());
        assert!(timestamp::parse("2024-10-30T12:00:00.123456").is_some());
        assert!(timestamp::parse("2024-10-30 12:00:00").is_some());
        assert!(timestamp::parse("30/10/2024").is_none());
    }
}
