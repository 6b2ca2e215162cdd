pub mod history;
pub mod run;
