// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what the system
// works with: aligned sentence pairs and the abstractions
// other layers implement.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits

// An aligned (source, target) sentence pair
pub mod sentence_pair;

// Core abstractions (traits) that other layers implement
pub mod traits;
