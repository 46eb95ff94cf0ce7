//! Collection descriptors and the default registry of synced collections.

use serde::{Deserialize, Serialize};

/// Document id under which singleton collections are stored remotely.
pub const SINGLETON_DOCUMENT_ID: &str = "default";

/// Scalar cache keys that never participate in push or pull.
pub const SETTING_ACTIVE_USER_SESSION: &str = "cfo_active_user_session";
pub const SETTING_ENABLE_TELEGRAM_IMPORT: &str = "cfo_enable_telegram_import";
pub const SETTING_LAST_TELEGRAM_UPDATE_ID: &str = "cfo_last_telegram_update_id";
pub const SETTING_LAST_INSTAGRAM_SYNC_AT: &str = "cfo_last_instagram_sync_at";

/// Cache key of the collection external events are merged into.
pub const DEALS_CACHE_KEY: &str = "cfo_deals";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionShape {
    /// Ordered sequence of records, one remote document per record.
    List,
    /// A single document stored under [`SINGLETON_DOCUMENT_ID`].
    Singleton,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDescriptor {
    pub remote_name: String,
    pub cache_key: String,
    pub shape: CollectionShape,
    /// Archived records are hard-deleted remotely and dropped on pull.
    pub archivable: bool,
    /// Field used to collapse duplicates before write and after pull.
    pub business_key: Option<String>,
}

impl CollectionDescriptor {
    pub fn list(remote_name: &str, cache_key: &str) -> Self {
        Self {
            remote_name: remote_name.to_string(),
            cache_key: cache_key.to_string(),
            shape: CollectionShape::List,
            archivable: false,
            business_key: None,
        }
    }

    pub fn singleton(remote_name: &str, cache_key: &str) -> Self {
        Self {
            shape: CollectionShape::Singleton,
            ..Self::list(remote_name, cache_key)
        }
    }

    pub fn archivable(mut self) -> Self {
        self.archivable = true;
        self
    }

    pub fn with_business_key(mut self, key: &str) -> Self {
        self.business_key = Some(key.to_string());
        self
    }

    pub fn is_singleton(&self) -> bool {
        self.shape == CollectionShape::Singleton
    }
}

/// Ordered set of collections the engine keeps in sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionRegistry {
    collections: Vec<CollectionDescriptor>,
}

impl CollectionRegistry {
    pub fn new(collections: Vec<CollectionDescriptor>) -> Self {
        Self { collections }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionDescriptor> {
        self.collections.iter()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn by_cache_key(&self, cache_key: &str) -> Option<&CollectionDescriptor> {
        self.collections.iter().find(|c| c.cache_key == cache_key)
    }

    pub fn by_remote_name(&self, remote_name: &str) -> Option<&CollectionDescriptor> {
        self.collections.iter().find(|c| c.remote_name == remote_name)
    }
}

/// Registry of every business collection in the application.
pub fn default_registry() -> CollectionRegistry {
    use CollectionDescriptor as C;

    CollectionRegistry::new(vec![
        C::list("users", "cfo_users")
            .archivable()
            .with_business_key("login"),
        C::list("tasks", "cfo_tasks").archivable(),
        C::list("projects", "cfo_projects").archivable(),
        C::list("tables", "cfo_tables"),
        C::list("docs", "cfo_docs").archivable(),
        C::list("folders", "cfo_folders").archivable(),
        C::list("meetings", "cfo_meetings").archivable(),
        C::list("contentPosts", "cfo_content_posts").archivable(),
        C::list("activity", "cfo_activity"),
        C::list("statuses", "cfo_statuses"),
        C::list("priorities", "cfo_priorities"),
        C::list("clients", "cfo_clients").archivable(),
        C::list("contracts", "cfo_contracts").archivable(),
        C::list("employeeInfos", "cfo_employee_infos").archivable(),
        C::list("deals", DEALS_CACHE_KEY).archivable(),
        C::singleton("notificationPrefs", "cfo_notification_prefs"),
        C::list("departments", "cfo_departments"),
        C::list("financeCategories", "cfo_finance_categories"),
        C::singleton("financePlan", "cfo_finance_plan"),
        C::list("purchaseRequests", "cfo_purchase_requests").archivable(),
        C::list("financialPlanDocuments", "cfo_financial_plan_documents").archivable(),
        C::list("financialPlannings", "cfo_financial_plannings").archivable(),
        C::list("orgPositions", "cfo_org_positions"),
        C::list("businessProcesses", "cfo_business_processes").archivable(),
        C::list("automationRules", "cfo_automation_rules"),
        C::list("warehouses", "cfo_warehouses"),
        C::list("inventoryItems", "cfo_inventory_items"),
        C::list("stockMovements", "cfo_stock_movements"),
    ])
}
