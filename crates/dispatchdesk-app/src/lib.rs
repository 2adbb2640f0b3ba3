// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod codec;
pub mod demo;
pub mod editing;
pub mod fetch;
pub mod forms;
pub mod grid;
pub mod ids;
pub mod layout;
pub mod lazy_select;
pub mod model;
pub mod personalization;
pub mod selection;

pub use codec::*;
pub use editing::*;
pub use fetch::*;
pub use forms::*;
pub use grid::*;
pub use ids::*;
pub use layout::*;
pub use lazy_select::*;
pub use model::*;
pub use personalization::*;
pub use selection::*;
