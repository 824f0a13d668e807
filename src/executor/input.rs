// Input injection over the DevTools protocol.
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType,
    MouseButton,
};
use chromiumoxide::Page;

use crate::errors::{ParasightError, ParasightResult};

fn interaction_err(e: impl ToString) -> ParasightError {
    ParasightError::Interaction(e.to_string())
}

async fn dispatch_mouse(
    page: &Page,
    kind: DispatchMouseEventType,
    x: f64,
    y: f64,
    button: Option<MouseButton>,
) -> ParasightResult<()> {
    let mut builder = DispatchMouseEventParams::builder().r#type(kind).x(x).y(y);
    if let Some(button) = button {
        builder = builder.button(button).click_count(1);
    }
    let cmd = builder.build().map_err(interaction_err)?;
    page.execute(cmd).await.map_err(interaction_err)?;
    Ok(())
}

/// Press + release of the left button at `(x, y)` CSS pixels.
pub async fn mouse_click(page: &Page, x: f64, y: f64) -> ParasightResult<()> {
    dispatch_mouse(page, DispatchMouseEventType::MouseMoved, x, y, None).await?;
    dispatch_mouse(page, DispatchMouseEventType::MousePressed, x, y, Some(MouseButton::Left)).await?;
    dispatch_mouse(page, DispatchMouseEventType::MouseReleased, x, y, Some(MouseButton::Left)).await?;
    tracing::debug!(x, y, "mouse click dispatched");
    Ok(())
}

pub async fn mouse_move(page: &Page, x: f64, y: f64) -> ParasightResult<()> {
    dispatch_mouse(page, DispatchMouseEventType::MouseMoved, x, y, None).await?;
    tracing::debug!(x, y, "mouse move dispatched");
    Ok(())
}

/// Types `text` into whatever currently has focus, one key event pair per char.
pub async fn type_text(page: &Page, text: &str) -> ParasightResult<()> {
    for c in text.chars() {
        let key_down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .text(c.to_string())
            .build()
            .map_err(interaction_err)?;
        page.execute(key_down).await.map_err(interaction_err)?;

        let key_up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .text(c.to_string())
            .build()
            .map_err(interaction_err)?;
        page.execute(key_up).await.map_err(interaction_err)?;
    }
    tracing::debug!(chars = text.chars().count(), "text typed");
    Ok(())
}
