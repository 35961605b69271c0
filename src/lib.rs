pub mod attack;
pub mod chunker;
pub mod engine;
pub mod hash;
pub mod io;
pub mod mask;
pub mod report;
pub mod worker;

