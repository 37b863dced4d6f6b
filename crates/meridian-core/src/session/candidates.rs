//! Selector candidates per page role, most specific first.

pub const EMAIL_FIELDS: &[&str] = &[
    "input[type=\"email\"]",
    "input[name=\"email\"]",
    "input[id*=\"email\" i]",
    "input[name=\"username\"]",
    "input[autocomplete=\"username\"]",
    "#signInName",
    "#logonIdentifier",
];

pub const SUBMIT_EMAIL: &[&str] = &[
    "input[type=\"submit\"]",
    "button[type=\"submit\"]",
    "#next",
    "#continue",
    "button[id*=\"next\" i]",
];

pub const PASSWORD_FIELDS: &[&str] = &[
    "input[type=\"password\"]",
    "input[name=\"password\"]",
    "#password",
];

pub const SUBMIT_PASSWORD: &[&str] = &[
    "input[type=\"submit\"]",
    "button[type=\"submit\"]",
    "#next",
    "button[id*=\"login\" i]",
    "button[id*=\"signin\" i]",
];

/// Elements only present once logged in
pub const DASHBOARD_INDICATORS: &[&str] = &[
    ".dashboard",
    "[class*=\"dashboard\"]",
    "[data-testid*=\"dashboard\"]",
    "a[href*=\"logout\"]",
    "a[href*=\"sign-out\"]",
    "[class*=\"account-summary\"]",
];

/// Navigation links towards a usage view
pub const USAGE_LINKS: &[&str] = &[
    "a[href*=\"usage\"]",
    "a[href*=\"consumption\"]",
    "a[href*=\"energy-use\"]",
    "[data-testid*=\"usage\"]",
];

/// Controls that commonly trigger a data fetch when touched
pub const DATA_TRIGGERS: &[&str] = &[
    "select[name*=\"period\" i]",
    "select[name*=\"range\" i]",
    "button[aria-label*=\"refresh\" i]",
    "button[class*=\"refresh\"]",
];
