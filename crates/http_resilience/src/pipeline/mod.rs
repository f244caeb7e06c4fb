// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Composition of destination pipelines and the client registry.

mod clients;
mod compose;
mod name;

pub use clients::{ResilientClient, ResilientClients, ResilientClientsBuilder};
pub use name::destination_name;
