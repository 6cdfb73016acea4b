// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use validator::{Validate, ValidationError};

/// 平台标识
///
/// 一个外部商家目录来源（例如地图服务或点评站点）。
/// 标识在构造时统一转换为小写，保证比较和排序稳定。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PlatformId(String);

impl PlatformId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlatformId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PlatformId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<PlatformId> for String {
    fn from(value: PlatformId) -> Self {
        value.0
    }
}

/// 搜索规格
///
/// 完整描述一次采集要收集的内容。该值创建后不可变，
/// 相同的搜索规格应当产生可比较的结果集。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_rating_bounds"))]
pub struct SearchSpecification {
    /// 搜索地点（城市、街区或地址）
    #[validate(length(min = 1, message = "location cannot be empty"))]
    pub location: String,
    /// 关键词
    #[serde(default)]
    pub keyword: Option<String>,
    /// 类别/菜系过滤
    #[serde(default)]
    pub category: Option<String>,
    /// 最低评分
    #[serde(default)]
    #[validate(range(min = 0.0, max = 5.0))]
    pub min_rating: Option<f64>,
    /// 最高评分
    #[serde(default)]
    #[validate(range(min = 0.0, max = 5.0))]
    pub max_rating: Option<f64>,
    /// 最少评论数
    #[serde(default)]
    pub min_review_count: Option<u32>,
    /// 搜索半径（英里）
    #[serde(default)]
    #[validate(range(exclusive_min = 0.0))]
    pub radius_miles: Option<f64>,
    /// 价格档位过滤，例如 `$`、`$$`
    #[serde(default)]
    pub price_levels: Vec<String>,
    /// 启用的平台集合
    #[validate(length(min = 1, message = "at least one platform is required"))]
    pub platforms: BTreeSet<PlatformId>,
}

fn validate_rating_bounds(spec: &SearchSpecification) -> Result<(), ValidationError> {
    if let (Some(min), Some(max)) = (spec.min_rating, spec.max_rating) {
        if min > max {
            return Err(ValidationError::new("min_rating_exceeds_max_rating"));
        }
    }
    Ok(())
}

impl SearchSpecification {
    /// 创建新的搜索规格
    ///
    /// # 参数
    ///
    /// * `location` - 搜索地点
    /// * `platforms` - 启用的平台
    pub fn new<I, P>(location: impl Into<String>, platforms: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PlatformId>,
    {
        Self {
            location: location.into(),
            keyword: None,
            category: None,
            min_rating: None,
            max_rating: None,
            min_review_count: None,
            radius_miles: None,
            price_levels: Vec::new(),
            platforms: platforms.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_min_rating(mut self, rating: f64) -> Self {
        self.min_rating = Some(rating);
        self
    }

    pub fn with_min_review_count(mut self, count: u32) -> Self {
        self.min_review_count = Some(count);
        self
    }

    pub fn with_radius_miles(mut self, radius: f64) -> Self {
        self.radius_miles = Some(radius);
        self
    }
}
