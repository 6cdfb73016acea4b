// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::business::{
    Address, CanonicalBusinessRecord, GeoPoint, PlatformStats, RawBusinessRecord, SourceListing,
};
use crate::domain::models::search_spec::PlatformId;
use crate::domain::services::normalizer::{
    normalize_name, normalized_key, text_similarity, NormalizedAddress,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

/// 跨平台评论数的合并策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewCountStrategy {
    /// 取各平台中的最大值，避免重复计数
    #[default]
    Max,
    /// 各平台评论互不重叠，直接求和
    SumDistinctPlatforms,
}

/// 合并配置
///
/// 阈值和平台优先级都是可调参数。
#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    /// 坐标距离容差（米）
    pub distance_tolerance_m: f64,
    /// 名称相似度阈值
    pub name_similarity_cutoff: f64,
    /// 无坐标时的地址相似度阈值
    pub address_similarity_cutoff: f64,
    /// 平台优先级，靠前的平台字段优先
    pub platform_priority: Vec<PlatformId>,
    pub review_count_strategy: ReviewCountStrategy,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            distance_tolerance_m: 150.0,
            name_similarity_cutoff: 0.85,
            address_similarity_cutoff: 0.9,
            platform_priority: vec![PlatformId::new("google_maps"), PlatformId::new("yelp")],
            review_count_strategy: ReviewCountStrategy::Max,
        }
    }
}

/// 合并过程中的候选记录
#[derive(Debug, Clone)]
struct Candidate {
    rank: usize,
    name: String,
    address: Address,
    phone: Option<String>,
    website: Option<String>,
    price_level: Option<String>,
    categories: Vec<String>,
    location: Option<GeoPoint>,
    reviews: Vec<String>,
    sources: BTreeSet<PlatformId>,
    listings: BTreeSet<SourceListing>,
    platform_stats: BTreeMap<PlatformId, PlatformStats>,
    norm_name: String,
    norm_address: NormalizedAddress,
}

impl Candidate {
    fn from_raw(record: RawBusinessRecord, rank: usize) -> Self {
        let listing = SourceListing {
            platform: record.platform.clone(),
            source_id: record.source_id,
        };
        let stats = PlatformStats {
            rating: record.rating,
            review_count: record.review_count,
        };
        let mut candidate = Self {
            rank,
            name: record.name,
            address: record.address,
            phone: record.phone,
            website: record.website,
            price_level: record.price_level,
            categories: Vec::new(),
            location: record.location,
            reviews: Vec::new(),
            sources: BTreeSet::from([record.platform.clone()]),
            listings: BTreeSet::from([listing]),
            platform_stats: BTreeMap::from([(record.platform, stats)]),
            norm_name: String::new(),
            norm_address: NormalizedAddress::default(),
        };
        candidate.add_categories(record.categories);
        candidate.add_reviews(record.reviews);
        candidate.refresh();
        candidate
    }

    fn from_canonical(record: CanonicalBusinessRecord, rank: usize) -> Self {
        let mut candidate = Self {
            rank,
            name: record.name,
            address: record.address,
            phone: record.phone,
            website: record.website,
            price_level: record.price_level,
            categories: record.categories,
            location: record.location,
            reviews: record.reviews,
            sources: record.sources,
            listings: record.listings,
            platform_stats: record.platform_stats,
            norm_name: String::new(),
            norm_address: NormalizedAddress::default(),
        };
        candidate.refresh();
        candidate
    }

    fn refresh(&mut self) {
        self.norm_name = normalize_name(&self.name);
        self.norm_address = NormalizedAddress::from_address(&self.address);
    }

    fn first_listing(&self) -> Option<&SourceListing> {
        self.listings.iter().next()
    }

    fn add_categories(&mut self, categories: Vec<String>) {
        for category in categories {
            if !self
                .categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&category))
            {
                self.categories.push(category);
            }
        }
    }

    fn add_reviews(&mut self, reviews: Vec<String>) {
        for review in reviews {
            if !self.reviews.contains(&review) {
                self.reviews.push(review);
            }
        }
    }

    /// 吸收优先级更低的成员：只填补空字段，集合字段取并集
    fn absorb(&mut self, other: Candidate) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }

        if self.name.trim().is_empty() {
            self.name = other.name;
        }
        fill(&mut self.address.street, other.address.street);
        fill(&mut self.address.city, other.address.city);
        fill(&mut self.address.region, other.address.region);
        fill(&mut self.address.postal_code, other.address.postal_code);
        fill(&mut self.address.country, other.address.country);
        fill(&mut self.phone, other.phone);
        fill(&mut self.website, other.website);
        fill(&mut self.price_level, other.price_level);
        fill(&mut self.location, other.location);
        self.add_categories(other.categories);
        self.add_reviews(other.reviews);
        self.sources.extend(other.sources);
        self.listings.extend(other.listings);

        for (platform, stats) in other.platform_stats {
            self.platform_stats
                .entry(platform)
                .and_modify(|existing| {
                    let more_reviews = stats.review_count > existing.review_count;
                    let adds_rating = stats.review_count == existing.review_count
                        && existing.rating.is_none()
                        && stats.rating.is_some();
                    if more_reviews || adds_rating {
                        *existing = stats;
                    }
                })
                .or_insert(stats);
        }

        self.rank = self.rank.min(other.rank);
        self.refresh();
    }
}

/// 排序键：平台优先级、首个列表、名称
fn candidate_order(a: &Candidate, b: &Candidate) -> std::cmp::Ordering {
    a.rank
        .cmp(&b.rank)
        .then_with(|| a.first_listing().cmp(&b.first_listing()))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.norm_address.joined().cmp(&b.norm_address.joined()))
        .then_with(|| a.phone.cmp(&b.phone))
}

/// 街道开头的门牌号
fn house_number(street: &str) -> Option<&str> {
    street
        .split(' ')
        .next()
        .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))
}

/// 简单并查集
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        // 保持较小下标为根，分组顺序稳定
        let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[child] = root;
        true
    }
}

/// 合并去重引擎
///
/// 将多个平台返回的原始记录合并为规范商家集合。重复判定关系取连通分量，
/// 分量内按平台优先级折叠，然后重复直到不再有任何两条记录匹配。
/// 因此输出满足：任意两条记录都不构成重复，对输出再次合并结果不变。
pub struct MergeEngine {
    config: MergeConfig,
}

impl MergeEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    fn rank_of(&self, platform: &PlatformId) -> usize {
        self.config
            .platform_priority
            .iter()
            .position(|p| p == platform)
            .unwrap_or(self.config.platform_priority.len())
    }

    fn best_rank(&self, sources: &BTreeSet<PlatformId>) -> usize {
        sources
            .iter()
            .map(|p| self.rank_of(p))
            .min()
            .unwrap_or(self.config.platform_priority.len())
    }

    /// 合并各平台的原始记录
    ///
    /// 映射的键视为记录的来源平台。
    pub fn merge<I>(&self, input: I) -> Vec<CanonicalBusinessRecord>
    where
        I: IntoIterator<Item = (PlatformId, Vec<RawBusinessRecord>)>,
    {
        let candidates: Vec<Candidate> = input
            .into_iter()
            .flat_map(|(platform, records)| {
                records.into_iter().map(move |mut record| {
                    record.platform = platform.clone();
                    record
                })
            })
            .map(|record| {
                let rank = self.rank_of(&record.platform);
                Candidate::from_raw(record, rank)
            })
            .collect();

        self.reconcile(candidates)
    }

    /// 对已合并的规范记录再次合并
    pub fn remerge(&self, records: Vec<CanonicalBusinessRecord>) -> Vec<CanonicalBusinessRecord> {
        let candidates = records
            .into_iter()
            .map(|record| {
                let rank = self.best_rank(&record.sources);
                Candidate::from_canonical(record, rank)
            })
            .collect();
        self.reconcile(candidates)
    }

    /// 判断两条规范记录是否构成重复
    pub fn is_duplicate(&self, a: &CanonicalBusinessRecord, b: &CanonicalBusinessRecord) -> bool {
        let left = Candidate::from_canonical(a.clone(), self.best_rank(&a.sources));
        let right = Candidate::from_canonical(b.clone(), self.best_rank(&b.sources));
        self.matches(&left, &right)
    }

    fn reconcile(&self, mut candidates: Vec<Candidate>) -> Vec<CanonicalBusinessRecord> {
        let input_count = candidates.len();
        candidates.sort_by(candidate_order);

        let mut rounds = 0;
        loop {
            rounds += 1;
            let groups = self.group(candidates);
            let merged_any = groups.iter().any(|g| g.len() > 1);
            candidates = groups.into_iter().filter_map(Self::fold).collect();
            candidates.sort_by(candidate_order);
            if !merged_any {
                break;
            }
        }

        let output = self.emit(candidates);
        debug!(
            input = input_count,
            output = output.len(),
            rounds,
            "Merged business records"
        );
        output
    }

    /// 按重复关系划分连通分量，分量内保持排序顺序
    fn group(&self, candidates: Vec<Candidate>) -> Vec<Vec<Candidate>> {
        let n = candidates.len();
        let mut sets = DisjointSet::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                if self.matches(&candidates[i], &candidates[j]) {
                    sets.union(i, j);
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<Candidate>> = BTreeMap::new();
        for (index, candidate) in candidates.into_iter().enumerate() {
            let root = sets.find(index);
            groups.entry(root).or_default().push(candidate);
        }
        groups.into_values().collect()
    }

    fn fold(group: Vec<Candidate>) -> Option<Candidate> {
        let mut members = group.into_iter();
        let mut head = members.next()?;
        for member in members {
            head.absorb(member);
        }
        Some(head)
    }

    fn matches(&self, a: &Candidate, b: &Candidate) -> bool {
        if !a.listings.is_disjoint(&b.listings) {
            return true;
        }

        if let (Some(p), Some(q)) = (a.location, b.location) {
            return p.distance_m(&q) <= self.config.distance_tolerance_m
                && text_similarity(&a.norm_name, &b.norm_name) >= self.config.name_similarity_cutoff;
        }

        text_similarity(&a.norm_name, &b.norm_name) >= self.config.name_similarity_cutoff
            && self.address_matches(&a.norm_address, &b.norm_address)
    }

    /// 无坐标时的地址比较
    fn address_matches(&self, a: &NormalizedAddress, b: &NormalizedAddress) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        let cutoff = self.config.address_similarity_cutoff;

        if !a.street.is_empty() && !b.street.is_empty() {
            if let (Some(x), Some(y)) = (house_number(&a.street), house_number(&b.street)) {
                if x != y {
                    return false;
                }
            }
            if !a.city.is_empty() && !b.city.is_empty() && text_similarity(&a.city, &b.city) < cutoff
            {
                return false;
            }
            if !a.postal_code.is_empty()
                && !b.postal_code.is_empty()
                && a.postal_code != b.postal_code
            {
                return false;
            }
            return text_similarity(&a.street, &b.street) >= cutoff;
        }

        text_similarity(&a.joined(), &b.joined()) >= cutoff
    }

    fn combined_rating(stats: &BTreeMap<PlatformId, PlatformStats>) -> Option<f64> {
        let rated: Vec<(f64, u32)> = stats
            .values()
            .filter_map(|s| s.rating.map(|r| (r, s.review_count)))
            .collect();

        match rated.as_slice() {
            [] => None,
            [(rating, _)] => Some(*rating),
            many => {
                let total_weight: u64 = many.iter().map(|(_, w)| *w as u64).sum();
                let value = if total_weight == 0 {
                    many.iter().map(|(r, _)| r).sum::<f64>() / many.len() as f64
                } else {
                    many.iter().map(|(r, w)| r * *w as f64).sum::<f64>() / total_weight as f64
                };
                Some((value * 100.0).round() / 100.0)
            }
        }
    }

    fn combined_review_count(&self, stats: &BTreeMap<PlatformId, PlatformStats>) -> u32 {
        let counts = stats.values().map(|s| s.review_count);
        match self.config.review_count_strategy {
            ReviewCountStrategy::Max => counts.max().unwrap_or(0),
            ReviewCountStrategy::SumDistinctPlatforms => {
                counts.fold(0u32, |acc, c| acc.saturating_add(c))
            }
        }
    }

    /// 生成规范记录并按规范化键排序
    fn emit(&self, candidates: Vec<Candidate>) -> Vec<CanonicalBusinessRecord> {
        let mut keyed: Vec<(String, Candidate)> = candidates
            .into_iter()
            .map(|c| (normalized_key(&c.name, &c.norm_address), c))
            .collect();
        keyed.sort_by(|(ka, a), (kb, b)| {
            ka.cmp(kb)
                .then_with(|| a.first_listing().cmp(&b.first_listing()))
        });

        let mut previous_key: Option<String> = None;
        keyed
            .into_iter()
            .map(|(key, c)| {
                // 规范化键相同但不构成重复的记录，用首个列表区分标识
                let id_seed = match (&previous_key, c.first_listing()) {
                    (Some(prev), Some(listing)) if *prev == key => {
                        format!("{}#{}:{}", key, listing.platform, listing.source_id)
                    }
                    _ => key.clone(),
                };
                previous_key = Some(key.clone());

                CanonicalBusinessRecord {
                    id: Uuid::new_v5(&Uuid::NAMESPACE_OID, id_seed.as_bytes()),
                    rating: Self::combined_rating(&c.platform_stats),
                    review_count: self.combined_review_count(&c.platform_stats),
                    normalized_key: key,
                    name: c.name,
                    address: c.address,
                    phone: c.phone,
                    website: c.website,
                    price_level: c.price_level,
                    categories: c.categories,
                    location: c.location,
                    reviews: c.reviews,
                    sources: c.sources,
                    listings: c.listings,
                    platform_stats: c.platform_stats,
                }
            })
            .collect()
    }
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new(MergeConfig::default())
    }
}

#[cfg(test)]
#[path = "merge_engine_test.rs"]
mod tests;
