//! Contract tests verifying the collector API the allocator glue builds on.
//! These tests pin exported types, signatures and observable guarantees.
