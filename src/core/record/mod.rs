// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Record encoding and output streams

pub mod codec;
pub mod streams;

pub use codec::{
    format_flag, format_number, format_text, format_timestamp, DenormalizedRecord, StreamTag,
    DELIMITER,
};
pub use streams::StreamSet;
