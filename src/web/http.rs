use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, Response};

use super::dom;
use crate::error::ClientError;

fn request_error(err: JsValue) -> ClientError {
    ClientError::Request(dom::js_message(&err))
}

async fn send(request: Request) -> Result<Response, ClientError> {
    let window = dom::window()?;
    let value = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(request_error)?;
    let response: Response = value
        .dyn_into()
        .map_err(|_| ClientError::Request("fetch did not return a Response".into()))?;
    if !response.ok() {
        return Err(ClientError::Request(format!(
            "HTTP error! Status: {}",
            response.status()
        )));
    }
    Ok(response)
}

async fn body_text(response: Response) -> Result<String, ClientError> {
    let text = JsFuture::from(response.text().map_err(request_error)?)
        .await
        .map_err(request_error)?;
    text.as_string()
        .ok_or_else(|| ClientError::Request("response body was not text".into()))
}

/// GET a same-origin path and return the body of a 2xx response.
pub async fn get_text(path: &str) -> Result<String, ClientError> {
    let request = Request::new_with_str(path).map_err(request_error)?;
    body_text(send(request).await?).await
}

/// POST a JSON body; resolves once a 2xx status came back.
pub async fn post_json(path: &str, body: &str) -> Result<u16, ClientError> {
    let init = RequestInit::new();
    init.set_method("POST");
    init.set_body(&JsValue::from_str(body));
    let request = Request::new_with_str_and_init(path, &init).map_err(request_error)?;
    request
        .headers()
        .set("Content-Type", "application/json")
        .map_err(request_error)?;
    Ok(send(request).await?.status())
}
