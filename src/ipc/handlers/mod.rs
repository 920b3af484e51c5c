pub mod attendance;
pub mod core;
pub mod exams;
pub mod reports;
pub mod seating;
pub mod settings;
pub mod students;
pub mod teachers;
pub mod view;
