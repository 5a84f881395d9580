pub mod health;
pub mod images;
pub mod multipart;
pub mod patients;
pub mod visits;
