// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Built-in step kinds (§4.4).

pub mod expand_template;
pub mod generate;
pub mod llm_completion;
pub mod llm_extraction;
pub mod text2image;
