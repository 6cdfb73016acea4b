// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 名称与地址规范化
//!
//! 合并引擎比较记录前先把名称和地址转换成规范形式：
//! 转写为 ASCII、小写、去除标点、去掉常见公司后缀、展开地址缩写。

use crate::domain::models::business::Address;
use deunicode::deunicode;
use std::collections::BTreeSet;

/// 名称末尾可忽略的公司后缀
const NAME_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "llc",
    "ltd",
    "limited",
    "co",
    "corp",
    "corporation",
    "company",
    "plc",
    "llp",
];

/// 规范化通用文本
///
/// 撇号直接删除（"Tony's" 与 "Tonys" 等价），`&` 视为 "and"，
/// 其余非字母数字字符视为分隔符。
pub fn normalize_text(text: &str) -> String {
    let ascii = deunicode(text).to_lowercase();
    let mut out = String::with_capacity(ascii.len());
    for ch in ascii.chars() {
        match ch {
            '\'' | '`' => {}
            '&' => out.push_str(" and "),
            c if c.is_ascii_alphanumeric() => out.push(c),
            _ => out.push(' '),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 规范化商家名称
pub fn normalize_name(name: &str) -> String {
    let normalized = normalize_text(name);
    let mut tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();

    while tokens.len() > 1 && tokens.last().is_some_and(|t| NAME_SUFFIXES.contains(t)) {
        tokens.pop();
    }
    if tokens.len() > 1 && tokens[0] == "the" {
        tokens.remove(0);
    }

    tokens.join(" ")
}

/// 展开常见的地址缩写
fn expand_abbreviation(token: &str) -> &str {
    match token {
        "st" | "str" => "street",
        "ave" | "av" => "avenue",
        "rd" => "road",
        "blvd" => "boulevard",
        "dr" => "drive",
        "ln" => "lane",
        "ct" => "court",
        "pl" => "place",
        "hwy" => "highway",
        "pkwy" => "parkway",
        "sq" => "square",
        "ter" => "terrace",
        "cir" => "circle",
        "ste" => "suite",
        "apt" => "apartment",
        "fl" => "floor",
        "n" => "north",
        "s" => "south",
        "e" => "east",
        "w" => "west",
        "ne" => "northeast",
        "nw" => "northwest",
        "se" => "southeast",
        "sw" => "southwest",
        other => other,
    }
}

/// 规范化街道地址
pub fn normalize_street(street: &str) -> String {
    normalize_text(street)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(expand_abbreviation)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 取邮编的前 5 位数字
pub fn normalize_postal_code(postal: &str) -> String {
    let digits: String = postal.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 5 {
        digits[..5].to_string()
    } else {
        normalize_text(postal)
    }
}

/// 规范化后的地址
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedAddress {
    pub street: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
}

impl NormalizedAddress {
    pub fn from_address(address: &Address) -> Self {
        let norm = |value: &Option<String>, f: fn(&str) -> String| {
            value.as_deref().map(f).unwrap_or_default()
        };
        Self {
            street: norm(&address.street, normalize_street),
            city: norm(&address.city, normalize_text),
            region: norm(&address.region, normalize_text),
            postal_code: norm(&address.postal_code, normalize_postal_code),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.street.is_empty() && self.city.is_empty() && self.region.is_empty()
    }

    /// 所有组成部分拼接的文本
    pub fn joined(&self) -> String {
        [&self.street, &self.city, &self.region, &self.postal_code]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 规范化键：`名称|街道|城市|邮编`
pub fn normalized_key(name: &str, address: &NormalizedAddress) -> String {
    format!(
        "{}|{}|{}|{}",
        normalize_name(name),
        address.street,
        address.city,
        address.postal_code
    )
}

/// 词集合的 Jaccard 重叠度
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let left: BTreeSet<&str> = a.split_whitespace().collect();
    let right: BTreeSet<&str> = b.split_whitespace().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(&right).count() as f64;
    let union = left.union(&right).count() as f64;
    intersection / union
}

/// 规范化文本相似度
///
/// 取词集合重叠度与编辑距离比例中的较大值，空串与任何文本的相似度为 0。
pub fn text_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    token_set_similarity(a, b).max(strsim::normalized_levenshtein(a, b))
}
