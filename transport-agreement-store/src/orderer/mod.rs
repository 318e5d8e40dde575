// SPDX-License-Identifier: MIT OR Apache-2.0

mod memory;
mod traits;

pub use memory::OrdererMemoryStore;
pub use traits::OrdererStore;
