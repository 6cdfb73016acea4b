// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::search_spec::PlatformId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// 地理坐标（WGS84）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// 平均地球半径（米）
    const EARTH_RADIUS_M: f64 = 6_371_008.8;

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// 使用 haversine 公式计算两点间的大圆距离（米）
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        Self::EARTH_RADIUS_M * c
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// 地址组成部分
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    /// 街道地址
    #[serde(default)]
    pub street: Option<String>,
    /// 城市
    #[serde(default)]
    pub city: Option<String>,
    /// 州/省
    #[serde(default)]
    pub region: Option<String>,
    /// 邮政编码
    #[serde(default)]
    pub postal_code: Option<String>,
    /// 国家
    #[serde(default)]
    pub country: Option<String>,
}

impl Address {
    /// 是否至少包含一项可用于定位的信息
    pub fn has_location(&self) -> bool {
        [&self.street, &self.city, &self.region]
            .iter()
            .any(|part| part.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }

    /// 格式化的完整地址
    pub fn full(&self) -> String {
        [
            &self.street,
            &self.city,
            &self.region,
            &self.postal_code,
        ]
        .iter()
        .filter_map(|part| part.as_deref())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// 原始商家记录
///
/// 单个平台返回的一条商家列表。在交给合并引擎之前，
/// 该记录由产生它的适配器调用独占。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBusinessRecord {
    /// 来源平台
    pub platform: PlatformId,
    /// 平台原生标识
    pub source_id: String,
    /// 商家名称
    pub name: String,
    /// 地址
    #[serde(default)]
    pub address: Address,
    /// 电话
    #[serde(default)]
    pub phone: Option<String>,
    /// 网站
    #[serde(default)]
    pub website: Option<String>,
    /// 评分 (0-5)
    #[serde(default)]
    pub rating: Option<f64>,
    /// 评论数
    #[serde(default)]
    pub review_count: u32,
    /// 价格档位
    #[serde(default)]
    pub price_level: Option<String>,
    /// 类别标签
    #[serde(default)]
    pub categories: Vec<String>,
    /// 地理坐标
    #[serde(default)]
    pub location: Option<GeoPoint>,
    /// 原始评论文本
    #[serde(default)]
    pub reviews: Vec<String>,
}

impl RawBusinessRecord {
    pub fn new(
        platform: impl Into<PlatformId>,
        source_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            source_id: source_id.into(),
            name: name.into(),
            address: Address::default(),
            phone: None,
            website: None,
            rating: None,
            review_count: 0,
            price_level: None,
            categories: Vec::new(),
            location: None,
            reviews: Vec::new(),
        }
    }

    pub fn with_street(mut self, street: impl Into<String>) -> Self {
        self.address.street = Some(street.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.address.city = Some(city.into());
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some(GeoPoint::new(latitude, longitude));
        self
    }

    pub fn with_rating(mut self, rating: f64, review_count: u32) -> Self {
        self.rating = Some(rating);
        self.review_count = review_count;
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }
}

/// 平台上的一条具体列表引用
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceListing {
    pub platform: PlatformId,
    pub source_id: String,
}

/// 规范商家记录
///
/// 合并去重后的商家表示。包含原始记录的全部字段，
/// 外加贡献平台集合 `sources` 以及从规范化键派生的稳定标识。
/// 一经产出即不可变，下游只读。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalBusinessRecord {
    /// 稳定标识（规范化键的 UUID v5）
    pub id: Uuid,
    /// 规范化键
    pub normalized_key: String,
    pub name: String,
    pub address: Address,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub price_level: Option<String>,
    pub categories: Vec<String>,
    pub location: Option<GeoPoint>,
    pub reviews: Vec<String>,
    /// 贡献平台，永不为空
    pub sources: BTreeSet<PlatformId>,
    /// 所有被合并进来的平台列表
    pub listings: BTreeSet<SourceListing>,
    /// 每个平台的评分与评论数
    pub platform_stats: BTreeMap<PlatformId, PlatformStats>,
}

/// 单个平台对商家的评分统计
///
/// 同一平台出现多条列表时，保留评论数最多的那条。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlatformStats {
    pub rating: Option<f64>,
    pub review_count: u32,
}

impl CanonicalBusinessRecord {
    /// 是否由多个平台共同贡献
    pub fn is_cross_platform(&self) -> bool {
        self.sources.len() > 1
    }
}
