//! Built-in catalog of cloneable entity types.
//!
//! Covers the site content, navigation, and commerce tables of one
//! organization. Courses and quizzes are owned by the learning module and are
//! never cloned, so products keep no reference to them.

use serde_json::json;

use tenantclone_core::CloneableEntityType as Entity;
use tenantclone_core::MissingTargetPolicy::{Fail, NullOut};
use tenantclone_core::UniqueKind::{Name, Slug};

/// Descriptors for every table cloned by default.
///
/// Listed roughly in clone order; [`crate::ClonePlan`] does the actual
/// ordering.
pub fn default_catalog() -> Vec<Entity> {
    vec![
        Entity::new("settings", "settings")
            .singleton()
            .external("domain")
            .external("stripe_secret_key")
            .external("stripe_publishable_key")
            .external("stripe_webhook_secret")
            .override_destination_name("site"),
        Entity::new("website_hero", "website_hero")
            .singleton()
            .override_destination_name("name"),
        Entity::new("menu_item", "menu_items"),
        Entity::new("banner", "banners"),
        Entity::new("blog_post", "blog_post").unique("slug", Slug),
        Entity::new("product_sub_type", "product_sub_type")
            .unique("name", Name)
            .unique("slug", Slug),
        Entity::new("product", "product")
            .foreign_key("product_sub_type_id", "product_sub_type", NullOut)
            .uncloned_reference("course_connected_id", "course", NullOut)
            .uncloned_reference("quiz_id", "quiz", NullOut)
            .unique("slug", Slug)
            .external("stripe_product_id"),
        Entity::new("feature", "feature"),
        Entity::new("faq", "faq"),
        Entity::new("website_menu_item", "website_menuitem"),
        Entity::new("website_submenu_item", "website_submenuitem").foreign_key(
            "menu_item_id",
            "website_menu_item",
            Fail,
        ),
        Entity::new("template_section", "website_templatesection"),
        Entity::new("template_section_heading", "website_templatesectionheading"),
        Entity::new("page", "pages"),
        Entity::new("website_brand", "website_brand"),
        Entity::new("pricing_plan", "pricingplan")
            .foreign_key("product_id", "product", NullOut)
            .external("stripe_price_id")
            .external("stripe_price_id_annual"),
        Entity::new("pricing_plan_feature", "pricingplan_features")
            .via_parent("pricingplan_id", "pricing_plan")
            .foreign_key("feature_id", "feature", Fail),
        Entity::new("inventory", "inventory")
            .via_parent("pricing_plan_id", "pricing_plan")
            .override_value("quantity", json!(100)),
        Entity::new("pricing_plan_comparison", "pricingplan_comparison"),
        Entity::new("website_metric", "website_metric"),
        Entity::new("template_section_metric", "website_templatesection_metrics")
            .via_parent("templatesection_id", "template_section")
            .via_parent("metric_id", "website_metric"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClonePlan;

    #[test]
    fn test_default_catalog_builds_a_plan() {
        let plan = ClonePlan::new(default_catalog()).unwrap();
        assert_eq!(plan.len(), default_catalog().len());
    }

    #[test]
    fn test_default_catalog_order() {
        let plan = ClonePlan::new(default_catalog()).unwrap();
        let before = |a: &str, b: &str| plan.position(a).unwrap() < plan.position(b).unwrap();

        assert!(before("product_sub_type", "product"));
        assert!(before("product", "pricing_plan"));
        assert!(before("pricing_plan", "pricing_plan_feature"));
        assert!(before("feature", "pricing_plan_feature"));
        assert!(before("pricing_plan", "inventory"));
        assert!(before("website_menu_item", "website_submenu_item"));
        assert!(before("template_section", "template_section_metric"));
        assert!(before("website_metric", "template_section_metric"));
    }

    #[test]
    fn test_payment_identifiers_are_external() {
        let plan = ClonePlan::new(default_catalog()).unwrap();
        let externals = |name: &str| plan.get(name).unwrap().external_references.clone();

        assert!(externals("product").contains(&"stripe_product_id".to_string()));
        assert!(externals("pricing_plan").contains(&"stripe_price_id".to_string()));
        assert!(externals("settings").contains(&"stripe_secret_key".to_string()));
        assert!(externals("settings").contains(&"domain".to_string()));
    }

    #[test]
    fn test_catalog_round_trips_through_json() {
        let json = serde_json::to_string(&default_catalog()).unwrap();
        let plan = ClonePlan::from_json(&json).unwrap();
        assert_eq!(plan.len(), default_catalog().len());
    }
}
