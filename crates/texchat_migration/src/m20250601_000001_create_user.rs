use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 用户文档表：账户字段 + 个人 LLM 凭据
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(User::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(User::Email).string().not_null().default(""))
                    .col(ColumnDef::new(User::FirstName).string().not_null().default(""))
                    .col(ColumnDef::new(User::LastName).string().not_null().default(""))
                    .col(
                        ColumnDef::new(User::UseOwnLlmSettings)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(User::LlmModelName).string().not_null().default(""))
                    .col(ColumnDef::new(User::LlmApiUrl).string().not_null().default(""))
                    .col(ColumnDef::new(User::LlmApiKey).text().null())
                    .col(
                        ColumnDef::new(User::UpdatedAt)
                            .string()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 邮箱索引，便于账户页按邮箱查重
        manager
            .create_index(
                Index::create()
                    .name("idx_user_email")
                    .table(User::Table)
                    .col(User::Email)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(User::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
pub enum User {
    Table,
    Id,
    Email,
    FirstName,
    LastName,
    UseOwnLlmSettings,
    LlmModelName,
    LlmApiUrl,
    LlmApiKey,
    UpdatedAt,
}
