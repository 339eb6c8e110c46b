// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod durable;
pub mod ephemeral;
pub mod errors;
pub mod snapshot;
pub mod store;

pub use durable::{DurableStore, DurableStoreConfig};
pub use ephemeral::EphemeralStore;
pub use errors::{SnapshotError, StoreError};
pub use snapshot::SnapshotManager;
pub use store::Store;
