// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod collection;
pub mod fetch_coordinator;
pub mod http_adapter;
pub mod identity_pool;
pub mod proxy_list;
