pub mod assessments;
pub mod calendar;
pub mod core;
pub mod grades;
pub mod roster;
pub mod scores;
