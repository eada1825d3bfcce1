use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub title: String,

    /// Open set of category labels (user, product, order, report, config, ...)
    pub record_type: String,

    pub description: Option<String>,

    /// Username of the creator. Denormalized on purpose, not a foreign key.
    pub created_by: String,

    pub created_at: String,

    pub updated_at: String,

    /// Soft-delete flag. Reads, updates and deletes all filter on this.
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
