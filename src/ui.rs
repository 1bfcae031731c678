use iocraft::prelude::*;

use crate::import::STATUS_NEW;

#[derive(Default, Props)]
pub struct ProgressLineProps {
    pub message: String,
    pub done: bool,
}

#[component]
pub fn ProgressLine(props: &ProgressLineProps) -> impl Into<AnyElement<'static>> {
    let (icon, color) = if props.done {
        ("◆ ", Color::Green)
    } else {
        ("◇ ", Color::Reset)
    };

    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: color, content: icon)
            Text(content: &props.message)
        }
    }
}

#[derive(Default, Props)]
struct StatusIconProps {
    status: String,
    available: bool,
}

#[component]
fn StatusIcon(props: &StatusIconProps) -> impl Into<AnyElement<'static>> {
    let (icon, color) = if props.available {
        ("◆", Color::Green)
    } else if props.status.eq_ignore_ascii_case(STATUS_NEW) {
        ("◇", Color::Reset)
    } else {
        ("◐", Color::Yellow)
    };

    element! {
        Text(color: color, content: icon)
    }
}

#[derive(Default, Props)]
pub struct ImageStatusProps {
    pub id: u64,
    pub name: String,
    pub image_file: String,
    pub region: String,
    pub status: String,
    pub available: bool,
    pub elapsed: String,
}

#[component]
pub fn ImageStatus(props: &ImageStatusProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "┌ ")
                View(background_color: Color::Blue) {
                    Text(content: &props.name, color: Color::White)
                }
            }
            Text(content: format!("│ source {}", props.image_file))
            Text(content: format!("│ region {}", props.region))
            Text(content: format!("│ took {}", props.elapsed))
            View(flex_direction: FlexDirection::Row) {
                Text(content: "└ ")
                StatusIcon(status: props.status.clone(), available: props.available)
                Text(content: format!(" image {} is {}", props.id, props.status))
            }
        }
    }
}
