// proxy.rs - This module runs in the service worker context
use coi_core::proxy::{rewrite_head, ResponseHead};
use coi_core::{CacheMode, HeaderSet, RequestDescriptor, RequestMode, WorkerMessage};
use js_sys::{Array, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use wasm_bindgen_utils::prelude::serde_wasm_bindgen;
use web_sys::{
    ExtendableEvent, ExtendableMessageEvent, FetchEvent, Headers, Request, RequestCache,
    Response, ResponseInit, ServiceWorkerGlobalScope, WindowClient,
};

use crate::config::read_config;
use crate::console::Console;
use crate::errors::CoiError;
use crate::utils::describe_js_value;

/// Entry point for the service worker. Handlers must be attached during the
/// script's initial evaluation.
pub fn main() -> Result<(), CoiError> {
    let scope: ServiceWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .map_err(|_| CoiError::WrongContext("service worker"))?;
    let console = Console::worker(read_config().map(|c| c.quiet).unwrap_or(false));

    let install_scope = scope.clone();
    let oninstall = Closure::wrap(Box::new(move |event: ExtendableEvent| {
        console.info("Installing...");
        match install_scope.skip_waiting() {
            Ok(promise) => {
                let _ = event.wait_until(&promise);
            }
            Err(err) => console.error(&format!("skipWaiting failed: {}", describe_js_value(&err))),
        }
    }) as Box<dyn FnMut(ExtendableEvent)>);
    scope.set_oninstall(Some(oninstall.as_ref().unchecked_ref()));
    oninstall.forget();

    let activate_scope = scope.clone();
    let onactivate = Closure::wrap(Box::new(move |event: ExtendableEvent| {
        console.info("Activating...");
        let _ = event.wait_until(&activate_scope.clients().claim());
    }) as Box<dyn FnMut(ExtendableEvent)>);
    scope.set_onactivate(Some(onactivate.as_ref().unchecked_ref()));
    onactivate.forget();

    let fetch_scope = scope.clone();
    let onfetch = Closure::wrap(Box::new(move |event: FetchEvent| {
        let request = event.request();
        if !describe_request(&request).should_intercept() {
            return;
        }
        let scope = fetch_scope.clone();
        let fetch = move |request: &Request| scope.fetch_with_request(request);
        let promise = future_to_promise(respond(fetch, request, console));
        if let Err(err) = event.respond_with(&promise) {
            console.error(&format!("respondWith failed: {}", describe_js_value(&err)));
        }
    }) as Box<dyn FnMut(FetchEvent)>);
    scope.set_onfetch(Some(onfetch.as_ref().unchecked_ref()));
    onfetch.forget();

    let message_scope = scope.clone();
    let onmessage = Closure::wrap(Box::new(move |event: ExtendableMessageEvent| {
        let Ok(WorkerMessage::Deregister) =
            serde_wasm_bindgen::from_value::<WorkerMessage>(event.data())
        else {
            return;
        };
        let scope = message_scope.clone();
        let promise = future_to_promise(async move {
            deregister(&scope, console)
                .await
                .map(|_| JsValue::UNDEFINED)
                .map_err(JsValue::from)
        });
        let _ = event.wait_until(&promise);
    }) as Box<dyn FnMut(ExtendableMessageEvent)>);
    scope.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget();

    Ok(())
}

pub(crate) fn describe_request(request: &Request) -> RequestDescriptor {
    let cache = match request.cache() {
        RequestCache::NoStore => CacheMode::NoStore,
        RequestCache::Reload => CacheMode::Reload,
        RequestCache::NoCache => CacheMode::NoCache,
        RequestCache::ForceCache => CacheMode::ForceCache,
        RequestCache::OnlyIfCached => CacheMode::OnlyIfCached,
        _ => CacheMode::Default,
    };
    let mode = match request.mode() {
        web_sys::RequestMode::SameOrigin => RequestMode::SameOrigin,
        web_sys::RequestMode::NoCors => RequestMode::NoCors,
        web_sys::RequestMode::Navigate => RequestMode::Navigate,
        _ => RequestMode::Cors,
    };
    RequestDescriptor {
        url: request.url(),
        cache,
        mode,
    }
}

/// Never rejects with a fetch failure of its own: if the intercepted fetch or
/// the rewrite fails, the request is re-issued untouched through `fetch`.
async fn respond<F>(fetch: F, request: Request, console: Console) -> Result<JsValue, JsValue>
where
    F: Fn(&Request) -> Promise,
{
    match fetch_and_rewrite(&fetch, &request).await {
        Ok(response) => Ok(response.into()),
        Err(err) => {
            console.error(&format!("Fetch error: {err}"));
            JsFuture::from(fetch(&request)).await
        }
    }
}

async fn fetch_and_rewrite<F>(fetch: &F, request: &Request) -> Result<Response, CoiError>
where
    F: Fn(&Request) -> Promise,
{
    // fetch a copy so the fallback still has an unread body
    let upstream_request = request.clone()?;
    let response: Response = JsFuture::from(fetch(&upstream_request))
        .await?
        .dyn_into()?;
    rewrite_response(response)
}

/// Rebuilds `response` with the isolation headers. Null-body statuses are
/// returned as the same object.
pub(crate) fn rewrite_response(response: Response) -> Result<Response, CoiError> {
    let upstream = ResponseHead::new(
        response.status(),
        response.status_text(),
        header_set_from(&response.headers())?,
    );
    let Some(rewritten) = rewrite_head(&upstream) else {
        return Ok(response);
    };

    let init = ResponseInit::new();
    init.set_status(rewritten.status);
    init.set_status_text(&rewritten.status_text);
    init.set_headers(&headers_from(&rewritten.headers)?);
    Ok(Response::new_with_opt_readable_stream_and_init(
        response.body().as_ref(),
        &init,
    )?)
}

pub(crate) fn header_set_from(headers: &Headers) -> Result<HeaderSet, CoiError> {
    let mut set = HeaderSet::new();
    let Some(entries) = js_sys::try_iter(headers)? else {
        return Ok(set);
    };
    for entry in entries {
        let pair: Array = entry?.dyn_into()?;
        let name = pair.get(0).as_string().unwrap_or_default();
        let value = pair.get(1).as_string().unwrap_or_default();
        set.append(name, value);
    }
    Ok(set)
}

pub(crate) fn headers_from(set: &HeaderSet) -> Result<Headers, CoiError> {
    let headers = Headers::new()?;
    for (name, value) in set.iter() {
        headers.append(name, value)?;
    }
    Ok(headers)
}

async fn deregister(scope: &ServiceWorkerGlobalScope, console: Console) -> Result<(), CoiError> {
    console.info("Deregistering...");
    JsFuture::from(scope.registration().unregister()?).await?;

    let clients: Array = JsFuture::from(scope.clients().match_all())
        .await?
        .dyn_into()?;
    for client in clients.iter() {
        let Ok(window) = client.dyn_into::<WindowClient>() else {
            continue;
        };
        let url = window.url();
        match window.navigate(&url) {
            Ok(promise) => {
                if let Err(err) = JsFuture::from(promise).await {
                    console.error(&format!(
                        "Failed to navigate {url}: {}",
                        describe_js_value(&err)
                    ));
                }
            }
            Err(err) => console.error(&format!(
                "Failed to navigate {url}: {}",
                describe_js_value(&err)
            )),
        }
    }
    Ok(())
}
