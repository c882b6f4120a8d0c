//! 收件人解析器：为每个收件人构建占位符上下文
//!
//! 静态字段（姓名、证件号）直接取自收件人，动态字段（待缴罚单数）对数据存储做一次
//! 点查。每个收件人在任何通道分发之前恰好解析一次；查询失败只中止该收件人的处理。

use crate::core::batch::Recipient;
use crate::core::error::SendError;
use crate::store::ContactStore;
use crate::template::PlaceholderContext;

/// 联系人姓名占位符
pub const TOKEN_NAME: &str = "{name}";
/// 联系人证件号（cedula/RIF）占位符
pub const TOKEN_ID: &str = "{id}";
/// 待缴罚单数占位符
pub const TOKEN_PENDING_COUNT: &str = "{pending_count}";

/// 构建该收件人的占位符上下文；存储查询失败映射为 `DataUnavailable`
pub async fn resolve(
    recipient: &Recipient,
    store: &dyn ContactStore,
) -> Result<PlaceholderContext, SendError> {
    let pending = store
        .pending_fines_count(&recipient.id)
        .await
        .map_err(|e| SendError::DataUnavailable(e.to_string()))?;

    let mut ctx = PlaceholderContext::new();
    ctx.insert(TOKEN_NAME, recipient.name.clone());
    ctx.insert(TOKEN_ID, recipient.id.clone());
    ctx.insert(TOKEN_PENDING_COUNT, pending.to_string());
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::store::StoreError;
    use crate::template::render;

    struct FixedStore(u32);

    #[async_trait]
    impl ContactStore for FixedStore {
        async fn pending_fines_count(&self, _contact_id: &str) -> Result<u32, StoreError> {
            Ok(self.0)
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ContactStore for BrokenStore {
        async fn pending_fines_count(&self, _contact_id: &str) -> Result<u32, StoreError> {
            Err(StoreError::Query("connection refused".into()))
        }
    }

    fn ana() -> Recipient {
        Recipient {
            id: "V-1".into(),
            name: "Ana".into(),
            email: Some("a@x.com".into()),
            phone: Some("04121234567".into()),
        }
    }

    #[tokio::test]
    async fn test_resolve_builds_all_tokens() {
        let ctx = resolve(&ana(), &FixedStore(3)).await.unwrap();
        let out = render("{name}|{id}|{pending_count}", &ctx);
        assert_eq!(out, "Ana|V-1|3");
    }

    #[tokio::test]
    async fn test_resolve_zero_pending() {
        let ctx = resolve(&ana(), &FixedStore(0)).await.unwrap();
        assert_eq!(render("{pending_count}", &ctx), "0");
    }

    #[tokio::test]
    async fn test_store_failure_maps_to_data_unavailable() {
        let err = resolve(&ana(), &BrokenStore).await.unwrap_err();
        assert!(matches!(err, SendError::DataUnavailable(_)));
    }
}
