//! Pure health logic shared by the API
//!
//! Nothing here touches the database; callers load rows and pass them in.

pub mod advice;
pub mod age;
pub mod checkups;
pub mod invite;
pub mod vaccines;
pub mod vitals;
