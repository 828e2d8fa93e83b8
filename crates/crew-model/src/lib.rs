// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod mock;
pub(crate) mod openai_compat;
mod portal;
mod router;
mod types;

pub use mock::{MockPortal, ScriptedPortal};
pub use openai_compat::OpenAiCompatPortal;
pub use portal::{AgentBinding, FrameStream, ModelPortal, SessionSpec};
pub use router::{PortalRouter, RoutedPortal};
pub use types::*;
