//! Context-menu model for one entry, serialized as a JSON tree for the
//! front-end.

use serde::Serialize;

/// Item ids understood by the menu dispatcher.
pub const MENU_LAUNCH: &str = "launch";
pub const MENU_DOCK: &str = "dock";
pub const MENU_UNDOCK: &str = "undock";
pub const MENU_CLOSE_ALL: &str = "close-all";
pub const MENU_FORCE_QUIT: &str = "force-quit";
pub const MENU_WINDOW_PREFIX: &str = "win:";
pub const MENU_ACTION_PREFIX: &str = "action:";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuItem {
    pub id: String,
    pub text: String,
    /// Enabled flag, not the window-active flag.
    pub active: bool,
    #[serde(rename = "isCheckable")]
    pub checkable: bool,
    pub checked: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(rename = "iconHover", skip_serializing_if = "String::is_empty")]
    pub icon_hover: String,
    #[serde(rename = "iconInactive", skip_serializing_if = "String::is_empty")]
    pub icon_inactive: String,
    #[serde(rename = "subMenu", skip_serializing_if = "Vec::is_empty")]
    pub submenu: Vec<MenuItem>,
}

impl MenuItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            active: true,
            checkable: false,
            checked: false,
            icon: String::new(),
            icon_hover: String::new(),
            icon_inactive: String::new(),
            submenu: Vec::new(),
        }
    }

    pub fn checkable(mut self, checked: bool) -> Self {
        self.checkable = true;
        self.checked = checked;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Menu {
    pub items: Vec<MenuItem>,
    #[serde(rename = "checkableMenu")]
    pub checkable: bool,
    #[serde(rename = "singleCheck")]
    pub single_check: bool,
}

impl Menu {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Inputs the menu is derived from; kept plain so the builder stays a pure
/// function.
pub struct MenuInputs<'a> {
    pub app_name: &'a str,
    pub is_docked: bool,
    pub dockable: bool,
    /// (window id, title, is current) in sorted-id order.
    pub windows: Vec<(u64, String, bool)>,
    /// (action section, action display name).
    pub actions: &'a [(String, String)],
    pub any_closeable: bool,
}

/// Build the context menu from scratch. Layout follows the taskbar
/// convention: launch/window items first, app actions, then dock toggle and
/// the close/force-quit block for running entries.
pub fn build_menu(inputs: &MenuInputs) -> Menu {
    let mut items = Vec::new();

    if inputs.windows.is_empty() {
        items.push(MenuItem::new(MENU_LAUNCH, inputs.app_name));
    } else if inputs.windows.len() == 1 {
        items.push(MenuItem::new(MENU_LAUNCH, inputs.app_name));
    } else {
        for (id, title, current) in &inputs.windows {
            let mut item = MenuItem::new(format!("{MENU_WINDOW_PREFIX}{id}"), title.clone());
            item.checkable = true;
            item.checked = *current;
            items.push(item);
        }
    }

    for (section, name) in inputs.actions {
        items.push(MenuItem::new(
            format!("{MENU_ACTION_PREFIX}{section}"),
            name.clone(),
        ));
    }

    if inputs.dockable {
        if inputs.is_docked {
            items.push(MenuItem::new(MENU_UNDOCK, "Undock"));
        } else {
            items.push(MenuItem::new(MENU_DOCK, "Dock"));
        }
    }

    if !inputs.windows.is_empty() {
        let mut close = MenuItem::new(MENU_CLOSE_ALL, "Close All");
        close.active = inputs.any_closeable;
        items.push(close);
        items.push(MenuItem::new(MENU_FORCE_QUIT, "Force Quit"));
    }

    Menu {
        items,
        checkable: false,
        single_check: true,
    }
}
