// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

pub mod config;
pub mod error;
pub mod in_memory_channel;
pub mod mailbox;
pub mod master;
pub mod message_channel;
pub mod partition;
pub mod report;
pub mod reporter;
pub mod task_executor;
pub mod task_queue;
pub mod task_record;
pub mod thread_runtime;
pub mod worker;
