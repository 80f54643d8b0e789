pub mod health;
pub mod message;
pub mod request;
pub mod response;
pub mod sendgrid;
pub mod status;
pub mod template;
pub mod validation;
