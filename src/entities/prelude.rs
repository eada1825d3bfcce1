pub use super::records::Entity as Records;
pub use super::users::Entity as Users;
