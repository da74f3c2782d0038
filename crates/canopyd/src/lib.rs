pub mod cli;
pub mod inspect;
pub mod pipeline;
pub mod publish;
pub mod report;
