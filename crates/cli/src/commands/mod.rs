// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod chain;
pub mod dist;
pub mod keys;
pub mod publish;
pub mod status;
pub mod treehash;
pub mod verify;
