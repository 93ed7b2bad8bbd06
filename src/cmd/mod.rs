pub mod modes;
pub mod run;
pub mod serve;
