//! Cache vary-by dimensions resolved against the current request.
//!
//! | dimension           | value                                   |
//! |---------------------|-----------------------------------------|
//! | `url`               | request path                            |
//! | `theme`             | active theme code, empty without themes |
//! | `customer_group`    | effective customer group id             |
//! | `customer`          | customer id, empty for guests           |
//! | `customer_presence` | `1` signed in, `0` guest                |
//! | `query`             | canonical query string                  |
//! | `request_params`    | URL parameters joined with `/`          |
//! | `param:<name>`      | form field, else query field            |

use cms_rs_cache::VaryByResolver;

use crate::controller::Controller;

impl VaryByResolver for Controller {
    fn resolve_dimension(&self, dimension: &str) -> Option<String> {
        let request = self.request();
        let value = match dimension {
            "url" => request.path.clone(),
            "theme" => self
                .site()
                .themes()
                .active_theme()
                .filter(|_| self.site().themes().is_theming_enabled())
                .map(|theme| theme.code.clone())
                .unwrap_or_default(),
            "customer_group" => self.customer_group_id().to_string(),
            "customer" => self.customer().map(|c| c.id.to_string()).unwrap_or_default(),
            "customer_presence" => String::from(if self.customer().is_some() { "1" } else { "0" }),
            "query" => request.query_string(),
            "request_params" => self.params().join("/"),
            other => {
                let name = other.strip_prefix("param:")?;
                request.field(name).unwrap_or_default().to_string()
            }
        };
        Some(value)
    }

    fn request_field(&self, name: &str) -> Option<String> {
        self.request().field(name).map(ToString::to_string)
    }
}
