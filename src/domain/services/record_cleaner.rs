// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::business::RawBusinessRecord;
use crate::domain::models::search_spec::SearchSpecification;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static ZIP_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{5})").expect("Failed to compile zip regex"));

/// 折叠多余空白
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| collapse_whitespace(&v))
        .filter(|v| !v.is_empty())
}

/// 美国电话号码格式化为 `(AAA) BBB-CCCC`，其他号码只去掉分隔符
pub fn clean_phone(phone: &str) -> String {
    let digits: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    match digits.len() {
        10 => format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        11 if digits.starts_with('1') => {
            format!("({}) {}-{}", &digits[1..4], &digits[4..7], &digits[7..])
        }
        _ => digits,
    }
}

/// 提取 5 位邮编，找不到时保持原值
pub fn clean_postal_code(postal: &str) -> String {
    ZIP_REGEX
        .captures(postal)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| postal.trim().to_string())
}

/// 缺少协议的网址补全为 https
pub fn clean_website(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// 清洗一条原始记录
///
/// 名称少于 2 个字符、没有任何位置信息、评分不在 0..=5 之间的记录被丢弃。
pub fn clean_record(mut record: RawBusinessRecord) -> Option<RawBusinessRecord> {
    record.name = collapse_whitespace(&record.name);
    if record.name.chars().count() < 2 {
        debug!(source_id = %record.source_id, "Dropping record with missing name");
        return None;
    }

    record.address.street = clean_optional(record.address.street.take());
    record.address.city = clean_optional(record.address.city.take());
    record.address.region = clean_optional(record.address.region.take());
    record.address.country = clean_optional(record.address.country.take());
    record.address.postal_code =
        clean_optional(record.address.postal_code.take()).map(|p| clean_postal_code(&p));
    if !record.address.has_location() {
        debug!(source_id = %record.source_id, name = %record.name, "Dropping record without location");
        return None;
    }

    if let Some(rating) = record.rating {
        if !(0.0..=5.0).contains(&rating) {
            debug!(source_id = %record.source_id, rating, "Dropping record with invalid rating");
            return None;
        }
    }

    record.phone = clean_optional(record.phone.take())
        .map(|p| clean_phone(&p))
        .filter(|p| !p.is_empty());
    record.website = clean_optional(record.website.take()).map(|w| clean_website(&w));
    record.price_level = clean_optional(record.price_level.take());
    record.categories = record
        .categories
        .into_iter()
        .map(|c| collapse_whitespace(&c))
        .filter(|c| !c.is_empty())
        .collect();
    record.reviews.retain(|r| !r.trim().is_empty());
    if record.location.is_some_and(|p| !p.is_valid()) {
        record.location = None;
    }

    Some(record)
}

/// 判断记录是否满足搜索规格中的过滤条件
///
/// 没有评分的记录不受评分条件限制。
pub fn matches_spec(record: &RawBusinessRecord, spec: &SearchSpecification) -> bool {
    if let (Some(min), Some(rating)) = (spec.min_rating, record.rating) {
        if rating < min {
            return false;
        }
    }
    if let (Some(max), Some(rating)) = (spec.max_rating, record.rating) {
        if rating > max {
            return false;
        }
    }
    if let Some(min_reviews) = spec.min_review_count {
        if record.review_count < min_reviews {
            return false;
        }
    }
    if let Some(category) = spec.category.as_deref().filter(|c| !c.trim().is_empty()) {
        let category = category.trim().to_lowercase();
        if !record
            .categories
            .iter()
            .any(|c| c.to_lowercase().contains(&category))
        {
            return false;
        }
    }
    if let Some(keyword) = spec.keyword.as_deref().filter(|k| !k.trim().is_empty()) {
        let keyword = keyword.trim().to_lowercase();
        let searchable = format!("{} {}", record.name, record.categories.join(" ")).to_lowercase();
        if !searchable.contains(&keyword) {
            return false;
        }
    }
    if !spec.price_levels.is_empty() {
        match &record.price_level {
            Some(level) if spec.price_levels.iter().any(|p| p == level) => {}
            _ => return false,
        }
    }
    true
}

/// 清洗并过滤一批记录，返回被接受的记录
pub fn prepare_records(
    records: Vec<RawBusinessRecord>,
    spec: &SearchSpecification,
) -> Vec<RawBusinessRecord> {
    records
        .into_iter()
        .filter_map(clean_record)
        .filter(|record| matches_spec(record, spec))
        .collect()
}
