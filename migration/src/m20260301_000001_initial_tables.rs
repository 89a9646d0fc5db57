use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 hash 表
        manager
            .create_table(
                Table::create()
                    .table(Hash::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Hash::Hash)
                            .string_len(16)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Hash::Available)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建 url 表
        manager
            .create_table(
                Table::create()
                    .table(Url::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Url::Hash)
                            .string_len(16)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Url::Url).text().not_null())
                    .col(
                        ColumnDef::new(Url::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_url_url_unique")
                    .table(Url::Table)
                    .col(Url::Url)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 清理任务按 created_at 扫描
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_url_created_at")
                    .table(Url::Table)
                    .col(Url::CreatedAt)
                    .to_owned(),
            )
            .await?;

        let conn = manager.get_connection();

        // Partial index: claim scans only touch available rows.
        conn.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_hash_available ON hash (hash) \
             WHERE available IS NULL OR available = true",
        )
        .await?;

        // Monotone sequence backing next_sequence().
        conn.execute_unprepared("CREATE SEQUENCE IF NOT EXISTS unique_number_seq START 1")
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();
        conn.execute_unprepared("DROP SEQUENCE IF EXISTS unique_number_seq")
            .await?;
        conn.execute_unprepared("DROP INDEX IF EXISTS idx_hash_available")
            .await?;

        manager
            .drop_index(Index::drop().name("idx_url_created_at").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_url_url_unique").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Url::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Hash::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Hash {
    Table,
    Hash,
    Available,
}

#[derive(DeriveIden)]
enum Url {
    Table,
    Hash,
    Url,
    CreatedAt,
}
