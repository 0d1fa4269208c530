//! PostgreSQL repository backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{RfpFilter, RfpStore, RfpTransaction, StoreError};
use crate::domain::{
    ActivityLog, DocumentVersion, Rfp, RfpContent, RfpDocument, RfpStatus, Role,
    SupplierResponse, SupplierResponseView, User,
};
use crate::services::search::SearchQuery;

const RFP_COLUMNS: &str =
    "id, title, description, requirements, status, owner_id, created_at, updated_at";

/// Database row for RFP
#[derive(Debug, sqlx::FromRow)]
struct RfpRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    requirements: Option<String>,
    status: String,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RfpRow> for Rfp {
    type Error = StoreError;

    fn try_from(row: RfpRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<RfpStatus>()
            .map_err(|e| StoreError::Corrupt(format!("rfps.status: {}", e)))?;
        Ok(Self {
            id: row.id,
            title: row.title,
            description: row.description,
            requirements: row.requirements,
            status,
            owner_id: row.owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for user
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Corrupt(format!("users.role: {}", e)))?;
        Ok(Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role,
            active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SupplierResponseRow {
    id: Uuid,
    rfp_id: Uuid,
    rfp_title: String,
    rfp_status: String,
    owner_email: String,
    content: String,
    submitted_at: DateTime<Utc>,
    rfp_created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct VersionRow {
    id: Uuid,
    rfp_document_id: Uuid,
    version_number: i32,
    storage_key: String,
    uploaded_by: Option<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<VersionRow> for DocumentVersion {
    fn from(row: VersionRow) -> Self {
        Self {
            id: row.id,
            document_id: row.rfp_document_id,
            version_number: row.version_number,
            storage_key: row.storage_key,
            uploaded_by: row.uploaded_by,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    rfp_id: Uuid,
    filename: String,
    storage_path: String,
    created_at: DateTime<Utc>,
}

impl From<DocumentRow> for RfpDocument {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            rfp_id: row.rfp_id,
            filename: row.filename,
            storage_path: row.storage_path,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ActivityRow {
    id: Uuid,
    rfp_id: Uuid,
    actor_id: Option<Uuid>,
    action: String,
    details: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for ActivityLog {
    fn from(row: ActivityRow) -> Self {
        Self {
            id: row.id,
            rfp_id: row.rfp_id,
            actor_id: row.actor_id,
            action: row.action,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ResponseRow {
    id: Uuid,
    rfp_id: Uuid,
    supplier_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<ResponseRow> for SupplierResponse {
    fn from(row: ResponseRow) -> Self {
        Self {
            id: row.id,
            rfp_id: row.rfp_id,
            supplier_id: row.supplier_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            return StoreError::UniqueViolation(db.constraint().unwrap_or("unique").to_string());
        }
    }
    StoreError::Database(e)
}

/// Make user text match literally inside an `ILIKE ... ESCAPE '\'` pattern.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn into_rfps(rows: Vec<RfpRow>) -> Result<Vec<Rfp>, StoreError> {
    rows.into_iter().map(Rfp::try_from).collect()
}

/// Repository backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RfpStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn RfpTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, role, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.active)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, role, is_active, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, role, is_active, created_at
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn get_rfp(&self, id: Uuid) -> Result<Option<Rfp>, StoreError> {
        sqlx::query_as::<_, RfpRow>(&format!("SELECT {} FROM rfps WHERE id = $1", RFP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Rfp::try_from)
            .transpose()
    }

    async fn find_rfps(
        &self,
        filter: &RfpFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Rfp>, i64), StoreError> {
        const PREDICATE: &str = r#"
            ($1::uuid IS NULL OR owner_id = $1)
            AND ($2::text IS NULL OR status = $2)
            AND ($3::text IS NULL OR title ILIKE '%' || $3 || '%' ESCAPE '\')
        "#;
        let status = filter.status.map(|s| s.as_str());
        let title = filter.title_contains.as_deref().map(escape_like);

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM rfps WHERE {}", PREDICATE))
                .bind(filter.owner_id)
                .bind(status)
                .bind(&title)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query_as::<_, RfpRow>(&format!(
            "SELECT {} FROM rfps WHERE {} ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5",
            RFP_COLUMNS, PREDICATE
        ))
        .bind(filter.owner_id)
        .bind(status)
        .bind(&title)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((into_rfps(rows)?, total))
    }

    async fn delete_rfp(&self, id: Uuid) -> Result<bool, StoreError> {
        // Documents, versions, responses and activity go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM rfps WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_responses(&self, rfp_id: Uuid) -> Result<Vec<SupplierResponse>, StoreError> {
        let rows = sqlx::query_as::<_, ResponseRow>(
            r#"
            SELECT id, rfp_id, supplier_id, content, created_at
            FROM responses
            WHERE rfp_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(rfp_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_supplier_responses(
        &self,
        supplier_id: Uuid,
    ) -> Result<Vec<SupplierResponseView>, StoreError> {
        let rows = sqlx::query_as::<_, SupplierResponseRow>(
            r#"
            SELECT r.id, r.rfp_id, p.title AS rfp_title, p.status AS rfp_status,
                   u.email AS owner_email, r.content, r.created_at AS submitted_at,
                   p.created_at AS rfp_created_at
            FROM responses r
            JOIN rfps p ON r.rfp_id = p.id
            JOIN users u ON p.owner_id = u.id
            WHERE r.supplier_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(supplier_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let rfp_status = row
                    .rfp_status
                    .parse::<RfpStatus>()
                    .map_err(|e| StoreError::Corrupt(format!("rfps.status: {}", e)))?;
                Ok(SupplierResponseView {
                    id: row.id,
                    rfp_id: row.rfp_id,
                    rfp_title: row.rfp_title,
                    rfp_status,
                    owner_email: row.owner_email,
                    content: row.content,
                    submitted_at: row.submitted_at,
                    rfp_created_at: row.rfp_created_at,
                })
            })
            .collect()
    }

    async fn responding_supplier_emails(&self, rfp_id: Uuid) -> Result<Vec<String>, StoreError> {
        let emails = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT u.email
            FROM responses r
            JOIN users u ON r.supplier_id = u.id
            WHERE r.rfp_id = $1
            ORDER BY u.email
            "#,
        )
        .bind(rfp_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(emails)
    }

    async fn list_activity(&self, rfp_id: Uuid) -> Result<Vec<ActivityLog>, StoreError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, rfp_id, actor_id, action, details, created_at
            FROM activity_logs
            WHERE rfp_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(rfp_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<RfpDocument>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, rfp_id, filename, storage_path, created_at FROM rfp_documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_documents(&self, rfp_id: Uuid) -> Result<Vec<RfpDocument>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, rfp_id, filename, storage_path, created_at
            FROM rfp_documents
            WHERE rfp_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(rfp_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_versions(&self, document_id: Uuid) -> Result<Vec<DocumentVersion>, StoreError> {
        let rows = sqlx::query_as::<_, VersionRow>(
            r#"
            SELECT id, rfp_document_id, version_number, storage_key, uploaded_by, notes, created_at
            FROM rfp_document_versions
            WHERE rfp_document_id = $1
            ORDER BY version_number DESC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_version(
        &self,
        document_id: Uuid,
        version_number: i32,
    ) -> Result<Option<DocumentVersion>, StoreError> {
        let row = sqlx::query_as::<_, VersionRow>(
            r#"
            SELECT id, rfp_document_id, version_number, storage_key, uploaded_by, notes, created_at
            FROM rfp_document_versions
            WHERE rfp_document_id = $1 AND version_number = $2
            "#,
        )
        .bind(document_id)
        .bind(version_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn refresh_search_projection(&self, rfp_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE rfps
            SET search_vector = to_tsvector('english',
                COALESCE(title, '') || ' ' ||
                COALESCE(description, '') || ' ' ||
                COALESCE(requirements, '')
            )
            WHERE id = $1
            "#,
        )
        .bind(rfp_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_projection(&self, rfp_id: Uuid) -> Result<Option<String>, StoreError> {
        let projection: Option<Option<String>> =
            sqlx::query_scalar("SELECT search_vector::text FROM rfps WHERE id = $1")
                .bind(rfp_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(projection.flatten())
    }

    async fn search_rfps(&self, query: &SearchQuery) -> Result<(Vec<Rfp>, i64), StoreError> {
        const PREDICATE: &str = r#"
            search_vector @@ plainto_tsquery('english', $1)
            AND ($2::uuid IS NULL OR owner_id = $2)
            AND ($3::text IS NULL OR status = $3)
        "#;
        let status = query.status.map(|s| s.as_str());

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM rfps WHERE {}", PREDICATE))
                .bind(&query.text)
                .bind(query.owner_id)
                .bind(status)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query_as::<_, RfpRow>(&format!(
            "SELECT {} FROM rfps WHERE {} ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5",
            RFP_COLUMNS, PREDICATE
        ))
        .bind(&query.text)
        .bind(query.owner_id)
        .bind(status)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((into_rfps(rows)?, total))
    }
}

/// Unit of work over a PostgreSQL transaction
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RfpTransaction for PgTransaction {
    async fn save_rfp(&mut self, rfp: &Rfp) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO rfps (id, title, description, requirements, status, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                requirements = EXCLUDED.requirements,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(rfp.id)
        .bind(&rfp.title)
        .bind(&rfp.description)
        .bind(&rfp.requirements)
        .bind(rfp.status.as_str())
        .bind(rfp.owner_id)
        .bind(rfp.created_at)
        .bind(rfp.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn compare_and_set_status(
        &mut self,
        id: Uuid,
        expected: RfpStatus,
        next: RfpStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Rfp>, StoreError> {
        sqlx::query_as::<_, RfpRow>(&format!(
            "UPDATE rfps SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2 RETURNING {}",
            RFP_COLUMNS
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Rfp::try_from)
        .transpose()
    }

    async fn update_content(
        &mut self,
        id: Uuid,
        expected: RfpStatus,
        content: &RfpContent,
        at: DateTime<Utc>,
    ) -> Result<Option<Rfp>, StoreError> {
        sqlx::query_as::<_, RfpRow>(&format!(
            r#"
            UPDATE rfps
            SET title = $3, description = $4, requirements = $5, updated_at = $6
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            RFP_COLUMNS
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(&content.title)
        .bind(&content.description)
        .bind(&content.requirements)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Rfp::try_from)
        .transpose()
    }

    async fn insert_response(&mut self, response: &SupplierResponse) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO responses (id, rfp_id, supplier_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(response.id)
        .bind(response.rfp_id)
        .bind(response.supplier_id)
        .bind(&response.content)
        .bind(response.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn append_activity(&mut self, entry: &ActivityLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs (id, rfp_id, actor_id, action, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.rfp_id)
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_document(&mut self, document: &RfpDocument) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO rfp_documents (id, rfp_id, filename, storage_path, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(document.id)
        .bind(document.rfp_id)
        .bind(&document.filename)
        .bind(&document.storage_path)
        .bind(document.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn next_version_number(&mut self, document_id: Uuid) -> Result<i32, StoreError> {
        let latest: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(version_number) FROM rfp_document_versions WHERE rfp_document_id = $1",
        )
        .bind(document_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(latest.unwrap_or(0) + 1)
    }

    async fn insert_version(&mut self, version: &DocumentVersion) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO rfp_document_versions
                (id, rfp_document_id, version_number, storage_key, uploaded_by, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(version.id)
        .bind(version.document_id)
        .bind(version.version_number)
        .bind(&version.storage_key)
        .bind(version.uploaded_by)
        .bind(&version.notes)
        .bind(version.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("desks"), "desks");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like(r"a\b"), r"a\\b");
    }
}
