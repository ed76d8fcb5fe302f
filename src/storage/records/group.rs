use crate::domain::group::Group;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GroupRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub icon_image: Option<String>,
    pub admin_id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl GroupRow {
    pub(crate) fn into_group(self, members: Vec<Uuid>) -> Group {
        Group {
            id: self.id,
            name: self.name,
            description: self.description,
            icon_image: self.icon_image,
            admin_id: self.admin_id,
            members,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
