#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    // Health
    pub const HEALTH: &'static str = "/health";
    pub const API_HEALTH: &'static str = "/api/health";

    // Auth and users
    pub const AUTH_LOGIN: &'static str = "/api/auth/login";
    pub const AUTH_LOGOUT: &'static str = "/api/auth/logout";
    pub const AUTH_ME: &'static str = "/api/auth/me";
    pub const AUTH_PASSWORD: &'static str = "/api/auth/password";
    pub const USERS: &'static str = "/api/users";
    pub const USER_BY_ID: &'static str = "/api/users/:id";

    // Companies
    pub const COMPANIES: &'static str = "/api/companies";
    pub const COMPANY_BY_ID: &'static str = "/api/companies/:id";
    pub const COMPANY_SWITCH: &'static str = "/api/companies/:id/switch";

    // Inventory
    pub const STONES: &'static str = "/api/stones";
    pub const STONE_BY_ID: &'static str = "/api/stones/:id";
    pub const STONE_IMAGE: &'static str = "/api/stones/:id/image";
    pub const STONE_SLABS: &'static str = "/api/stones/:id/slabs";
    pub const SLAB_BY_ID: &'static str = "/api/slabs/:id";
    pub const SLAB_IMAGE: &'static str = "/api/slabs/:id/image";
    pub const SLAB_CUT: &'static str = "/api/slabs/:id/cut";
    pub const CUT_PREVIEW: &'static str = "/api/cut/preview";
    pub const SINK_TYPES: &'static str = "/api/sinks";
    pub const SINK_TYPE_BY_ID: &'static str = "/api/sinks/:id";
    pub const SINK_TYPE_UNITS: &'static str = "/api/sinks/:id/units";
    pub const SINK_TYPE_IMAGE: &'static str = "/api/sinks/:id/image";
    pub const FAUCET_TYPES: &'static str = "/api/faucets";
    pub const FAUCET_TYPE_BY_ID: &'static str = "/api/faucets/:id";
    pub const FAUCET_TYPE_UNITS: &'static str = "/api/faucets/:id/units";
    pub const FAUCET_TYPE_IMAGE: &'static str = "/api/faucets/:id/image";

    // Customers and check-in
    pub const CUSTOMERS: &'static str = "/api/customers";
    pub const CUSTOMER_SEARCH: &'static str = "/api/customers/search";
    pub const CUSTOMER_BY_ID: &'static str = "/api/customers/:id";
    pub const CHECK_IN: &'static str = "/api/check-in/:company_id";

    // Deals board
    pub const DEALS: &'static str = "/api/deals";
    pub const DEAL_BY_ID: &'static str = "/api/deals/:id";
    pub const DEAL_MOVE: &'static str = "/api/deals/:id/move";
    pub const DEAL_LISTS: &'static str = "/api/deals/lists";
    pub const DEAL_LISTS_ORDER: &'static str = "/api/deals/lists/order";
    pub const DEAL_LIST_BY_ID: &'static str = "/api/deals/lists/:id";

    // Sales and payroll
    pub const SALES: &'static str = "/api/sales";
    pub const SALE_BY_ID: &'static str = "/api/sales/:id";
    pub const SALE_CANCEL: &'static str = "/api/sales/:id/cancel";
    pub const SALE_PAID: &'static str = "/api/sales/:id/paid";
    pub const SALE_INSTALLED: &'static str = "/api/sales/:id/installed";
    pub const SALE_UNSELL_SLAB: &'static str = "/api/sales/:id/slabs/:slab_id/unsell";
    pub const SALE_CHECKOUT: &'static str = "/api/sales/:id/checkout";
    pub const PAYROLL: &'static str = "/api/payroll";
    pub const PAYROLL_PAYMENTS: &'static str = "/api/payroll/payments";

    // Calendar
    pub const EVENTS: &'static str = "/api/events";
    pub const EVENTS_EXPORT: &'static str = "/api/events/export.ics";
    pub const EVENT_BY_ID: &'static str = "/api/events/:id";

    // Suppliers and documents
    pub const SUPPLIERS: &'static str = "/api/suppliers";
    pub const SUPPLIER_BY_ID: &'static str = "/api/suppliers/:id";
    pub const SUPPLIER_DOCUMENTS: &'static str = "/api/suppliers/:id/documents";
    pub const DOCUMENTS: &'static str = "/api/documents";
    pub const DOCUMENT_BY_ID: &'static str = "/api/documents/:id";
    pub const DOCUMENT_DOWNLOAD: &'static str = "/api/documents/:id/download";

    // Instructions and checklists
    pub const INSTRUCTIONS: &'static str = "/api/instructions";
    pub const INSTRUCTION_BY_ID: &'static str = "/api/instructions/:id";
    pub const INSTRUCTION_MOVE: &'static str = "/api/instructions/:id/move";
    pub const CHECKLISTS: &'static str = "/api/checklists";
    pub const CHECKLIST_BY_ID: &'static str = "/api/checklists/:id";
    pub const CHECKLIST_PDF: &'static str = "/api/checklists/:id/pdf";

    // QuickBooks
    pub const QBO: &'static str = "/api/qbo";
    pub const QBO_CONNECT: &'static str = "/api/qbo/connect";
    pub const QBO_CALLBACK: &'static str = "/api/qbo/callback";
    pub const QBO_STATUS: &'static str = "/api/qbo/status";
    pub const QBO_CUSTOMER_SYNC: &'static str = "/api/qbo/customers/:id/sync";
    pub const QBO_SALE_INVOICE: &'static str = "/api/qbo/sales/:id/invoice";

    // Stripe
    pub const STRIPE_WEBHOOK: &'static str = "/api/stripe/webhook";
}

/// Mutating routes that do not require an `X-CSRF-Token` header.
pub const CSRF_EXEMPT_PATHS: &[&str] = &[
    ApiUrls::AUTH_LOGIN,
    ApiUrls::QBO_CALLBACK,
    ApiUrls::STRIPE_WEBHOOK,
];

pub fn is_csrf_exempt(path: &str) -> bool {
    CSRF_EXEMPT_PATHS.contains(&path) || path.starts_with("/api/check-in/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csrf_exemptions() {
        assert!(is_csrf_exempt("/api/auth/login"));
        assert!(is_csrf_exempt("/api/stripe/webhook"));
        assert!(is_csrf_exempt("/api/check-in/7d6c1c1e-0000-0000-0000-000000000000"));
        assert!(!is_csrf_exempt("/api/stones"));
        assert!(!is_csrf_exempt("/api/auth/logout"));
    }
}
