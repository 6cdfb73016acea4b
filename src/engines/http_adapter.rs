// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::settings::PlatformSettings;
use crate::domain::models::business::{Address, GeoPoint, RawBusinessRecord};
use crate::domain::models::identity::IdentityLease;
use crate::domain::models::search_spec::{PlatformId, SearchSpecification};
use crate::domain::platform::{AdapterError, PlatformAdapter, RecordStream};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// 接口返回的一页商家
#[derive(Debug, Deserialize)]
struct ListingPage {
    #[serde(default, alias = "results")]
    businesses: Vec<ListingDto>,
    /// 下一页的完整地址
    #[serde(default, alias = "next_page")]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingDto {
    id: String,
    name: String,
    #[serde(default, alias = "address")]
    street: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default, alias = "state")]
    region: Option<String>,
    #[serde(default, alias = "zip")]
    postal_code: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    review_count: Option<u32>,
    #[serde(default, alias = "price")]
    price_level: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    reviews: Vec<String>,
}

impl ListingDto {
    fn into_record(self, platform: &PlatformId) -> RawBusinessRecord {
        RawBusinessRecord {
            platform: platform.clone(),
            source_id: self.id,
            name: self.name,
            address: Address {
                street: self.street,
                city: self.city,
                region: self.region,
                postal_code: self.postal_code,
                country: self.country,
            },
            phone: self.phone,
            website: self.website,
            rating: self.rating,
            review_count: self.review_count.unwrap_or(0),
            price_level: self.price_level,
            categories: self.categories,
            location: match (self.latitude, self.longitude) {
                (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
                _ => None,
            },
            reviews: self.reviews,
        }
    }
}

/// 根据 HTTP 状态码判断错误类别，成功时返回 `None`
pub fn classify_status(status: StatusCode) -> Option<AdapterError> {
    if status.is_success() {
        return None;
    }
    let reason = format!("HTTP {}", status.as_u16());
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN | StatusCode::REQUEST_TIMEOUT => {
            Some(AdapterError::transient(reason))
        }
        s if s.is_server_error() => Some(AdapterError::transient(reason)),
        _ => Some(AdapterError::permanent(reason)),
    }
}

fn classify_request_error(e: reqwest::Error) -> AdapterError {
    if e.is_decode() || e.is_builder() {
        AdapterError::permanent(e.to_string())
    } else {
        AdapterError::transient(e.to_string())
    }
}

/// JSON 列表接口适配器
///
/// 通过租约的代理和 User-Agent 请求一个返回 JSON 的商家列表接口，
/// 首页在调用时获取，后续分页在读取记录流时按需获取。
#[derive(Debug, Clone)]
pub struct JsonListingAdapter {
    id: PlatformId,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    max_pages: u32,
}

impl JsonListingAdapter {
    pub fn new(id: impl Into<PlatformId>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_pages: 10,
        }
    }

    pub fn from_settings(settings: &PlatformSettings) -> Self {
        let mut adapter = Self::new(settings.id.as_str(), settings.endpoint.clone())
            .with_timeout(Duration::from_secs(settings.timeout_secs));
        adapter.api_key = settings.api_key.clone();
        adapter
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// 为本次租约构建客户端
    fn client(&self, lease: &IdentityLease) -> Result<Client, AdapterError> {
        let mut builder = Client::builder()
            .user_agent(lease.user_agent())
            .timeout(self.timeout);
        if let Some(proxy) = lease.proxy() {
            let proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|e| AdapterError::permanent(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| AdapterError::permanent(format!("Failed to build HTTP client: {}", e)))
    }

    fn query(spec: &SearchSpecification) -> Vec<(&'static str, String)> {
        let mut query = vec![("location", spec.location.clone())];
        if let Some(keyword) = &spec.keyword {
            query.push(("keyword", keyword.clone()));
        }
        if let Some(category) = &spec.category {
            query.push(("category", category.clone()));
        }
        if let Some(radius) = spec.radius_miles {
            query.push(("radius_miles", radius.to_string()));
        }
        if let Some(rating) = spec.min_rating {
            query.push(("min_rating", rating.to_string()));
        }
        query
    }
}

/// 分页游标
struct Pager {
    client: Client,
    platform: PlatformId,
    api_key: Option<String>,
    next: Option<String>,
    pages_left: u32,
}

impl Pager {
    async fn fetch(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<ListingPage, AdapterError> {
        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(classify_request_error)?;
        if let Some(error) = classify_status(response.status()) {
            return Err(error);
        }
        response
            .json::<ListingPage>()
            .await
            .map_err(|e| AdapterError::permanent(format!("Undecodable listing page: {}", e)))
    }

    /// 读取下一页，没有更多页面时结束
    async fn next_page(mut self) -> Option<(Result<Vec<RawBusinessRecord>, AdapterError>, Self)> {
        if self.pages_left == 0 {
            return None;
        }
        let url = self.next.take()?;
        self.pages_left -= 1;
        debug!(platform = %self.platform, %url, "Fetching next listing page");

        let page = self.fetch(&url, &[]).await;
        let records = page.map(|page| {
            self.next = page.next;
            page.businesses
                .into_iter()
                .map(|dto| dto.into_record(&self.platform))
                .collect()
        });
        Some((records, self))
    }
}

#[async_trait]
impl PlatformAdapter for JsonListingAdapter {
    fn id(&self) -> PlatformId {
        self.id.clone()
    }

    async fn search(
        &self,
        spec: &SearchSpecification,
        lease: &IdentityLease,
    ) -> Result<RecordStream, AdapterError> {
        let pager = Pager {
            client: self.client(lease)?,
            platform: self.id.clone(),
            api_key: self.api_key.clone(),
            next: None,
            pages_left: self.max_pages.saturating_sub(1),
        };

        let first = pager.fetch(&self.endpoint, &Self::query(spec)).await?;
        debug!(
            platform = %self.id,
            identity = %lease.identity().label(),
            records = first.businesses.len(),
            "Fetched first listing page"
        );
        let first_records: Vec<RawBusinessRecord> = first
            .businesses
            .into_iter()
            .map(|dto| dto.into_record(&self.id))
            .collect();
        let pager = Pager {
            next: first.next,
            ..pager
        };

        let pages = stream::once(async move { Ok::<_, AdapterError>(first_records) })
            .chain(stream::unfold(pager, Pager::next_page))
            .map_ok(|records| stream::iter(records.into_iter().map(Ok)))
            .try_flatten();
        Ok(Box::pin(pages))
    }
}
