pub mod email;
pub mod issuance;
pub mod paystack;
pub mod qr;
pub mod reminders;
