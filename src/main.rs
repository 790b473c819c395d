//! Binix XHR - command line driver
//!
//! Issues one XMLHttpRequest against the real network and prints the event
//! trace followed by the response.
//!
//! Usage: `binix-xhr [--sync] [--timeout MS] METHOD URL`

use std::env;
use std::process;

use binix_xhr::{EngineConfig, Event, EventListener, NAME, ScriptContext, VERSION, XmlHttpRequest};

struct Options {
    synchronous: bool,
    timeout: u32,
    method: String,
    url: String,
}

fn usage() -> ! {
    eprintln!("Usage: binix-xhr [--sync] [--timeout MS] METHOD URL");
    process::exit(2);
}

fn parse_args() -> Options {
    let mut synchronous = false;
    let mut timeout = 0;
    let mut positional = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sync" => synchronous = true,
            "--timeout" => {
                timeout = match args.next().and_then(|v| v.parse().ok()) {
                    Some(ms) => ms,
                    None => usage(),
                };
            }
            "-h" | "--help" => usage(),
            _ => positional.push(arg),
        }
    }

    match <[String; 2]>::try_from(positional) {
        Ok([method, url]) => Options {
            synchronous,
            timeout,
            method,
            url,
        },
        Err(_) => usage(),
    }
}

fn main() {
    env_logger::init();
    let options = parse_args();

    println!("{} v{}", NAME, VERSION);

    let context = match ScriptContext::http(EngineConfig::default()) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            process::exit(1);
        }
    };

    let xhr = XmlHttpRequest::new(&context);
    for event_type in [
        "readystatechange",
        "loadstart",
        "progress",
        "load",
        "error",
        "abort",
        "timeout",
        "loadend",
    ] {
        xhr.add_event_listener(
            event_type,
            EventListener::new(|xhr: &XmlHttpRequest, event: &Event| match event.progress {
                Some(p) => println!(
                    "  {:<16} readyState={} loaded={} total={}",
                    event.event_type,
                    xhr.ready_state().as_u16(),
                    p.loaded,
                    p.total
                ),
                None => println!(
                    "  {:<16} readyState={}",
                    event.event_type,
                    xhr.ready_state().as_u16()
                ),
            }),
            false,
        );
    }

    let result = xhr
        .set_timeout(options.timeout)
        .and_then(|_| {
            xhr.open_with(&options.method, &options.url, !options.synchronous, None, None)
        })
        .and_then(|_| xhr.send(None));
    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1);
    }
    context.run_until_idle();

    println!();
    println!("{} {}", xhr.status(), xhr.status_text());
    print!("{}", xhr.get_all_response_headers());
    println!();
    match xhr.response_text() {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("{}", e),
    }
}
