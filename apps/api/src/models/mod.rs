pub mod answer;
pub mod assessment;
pub mod job_posting;
pub mod question;
pub mod repository;
pub mod score;
