use crate::domain::group::{Group, GroupUpdate};
use crate::error::{AppError, Result};
use crate::storage::records::group::GroupRow;
use crate::storage::{DbPool, GroupStore, NewGroup};
use async_trait::async_trait;
use uuid::Uuid;

const GROUP_COLUMNS: &str = "id, name, description, icon_image, admin_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgGroupStore {
    pool: DbPool,
}

impl PgGroupStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn members_of(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        let members: Vec<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM group_members WHERE group_id = $1 ORDER BY joined_at")
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(members)
    }
}

#[async_trait]
impl GroupStore for PgGroupStore {
    async fn create(&self, group: NewGroup) -> Result<Group> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, GroupRow>(&format!(
            r"
            INSERT INTO groups (name, description, icon_image, admin_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {GROUP_COLUMNS}
            "
        ))
        .bind(&group.name)
        .bind(&group.description)
        .bind(&group.icon_image)
        .bind(group.admin_id)
        .fetch_one(&mut *tx)
        .await?;

        // Admin is always seated first; requested members are deduplicated.
        let mut members = vec![group.admin_id];
        for id in group.member_ids {
            if !members.contains(&id) {
                members.push(id);
            }
        }
        for user_id in &members {
            sqlx::query("INSERT INTO group_members (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(row.id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(row.into_group(members))
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Group>> {
        let row = sqlx::query_as::<_, GroupRow>(&format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        let members = self.members_of(row.id).await?;
        Ok(Some(row.into_group(members)))
    }

    async fn update(&self, id: Uuid, update: GroupUpdate) -> Result<Group> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            r"
            UPDATE groups
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                icon_image = COALESCE($4, icon_image),
                updated_at = now()
            WHERE id = $1
            RETURNING {GROUP_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.icon_image)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;

        let members = self.members_of(row.id).await?;
        Ok(row.into_group(members))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM groups WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn add_member(&self, group_id: Uuid, user_id: Uuid) -> Result<()> {
        let result =
            sqlx::query("INSERT INTO group_members (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(group_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Duplicate("Already a member of this group".to_string()));
        }
        Ok(())
    }

    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Group>> {
        let rows = sqlx::query_as::<_, GroupRow>(&format!(
            r"
            SELECT g.{}
            FROM groups g
            JOIN group_members gm ON gm.group_id = g.id
            WHERE gm.user_id = $1
            ORDER BY g.updated_at DESC
            ",
            GROUP_COLUMNS.replace(", ", ", g.")
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let members = self.members_of(row.id).await?;
            groups.push(row.into_group(members));
        }
        Ok(groups)
    }
}
