//! Playwright helper script, error mapping, and availability checks.
//!
//! The helper is a long-lived Node process speaking JSON lines: one request
//! object per stdin line (`{"id", "op", ...}`), one reply per stdout line
//! (`{"id", "ok", "result" | "error"}`). Reply `0` is the launch handshake.

use crate::{DexError, Result};
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// argv: url, width, height, navTimeoutMs, headless(1/0), deviceScaleFactor, proxyUrl
pub(crate) const HELPER_SCRIPT: &str = r#"
const readline = require('readline');
const [, url, width, height, navTimeout, headlessFlag, scale, proxyUrl] = process.argv;

const handles = new Map();
let nextHandle = 1;
let browser;
let page;

function reply(id, ok, payload) {
  const msg = ok ? { id, ok: true, result: payload === undefined ? null : payload }
                 : { id, ok: false, error: payload };
  process.stdout.write(JSON.stringify(msg) + '\n');
}

function track(handle) {
  if (!handle) return null;
  const el = handle.asElement();
  if (!el) return null;
  const id = nextHandle++;
  handles.set(id, el);
  return id;
}

function el(id) {
  const found = handles.get(id);
  if (!found) throw new Error(`unknown element handle ${id}`);
  return found;
}

const ops = {
  async documentState() {
    return page.evaluate(() => {
      const root = document.querySelector('#app') || document.body;
      return {
        readyState: document.readyState,
        appMounted: !!root && root.children.length > 0,
      };
    });
  },
  async querySelector({ selector }) {
    return track(await page.$(selector));
  },
  async firstElementChild({ handle }) {
    return track(await el(handle).evaluateHandle((e) => e.firstElementChild));
  },
  async body() {
    return track(await page.$('body'));
  },
  async viewport() {
    return page.viewportSize();
  },
  async describe({ handle }) {
    return el(handle).evaluate((e) => {
      const rect = e.getBoundingClientRect();
      const style = window.getComputedStyle(e);
      return {
        tag: e.tagName,
        className: typeof e.className === 'string' ? e.className : (e.getAttribute('class') || ''),
        id: e.id || '',
        offsetWidth: e.offsetWidth || 0,
        offsetHeight: e.offsetHeight || 0,
        boundingBox: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
        computedStyle: {
          display: style.display,
          visibility: style.visibility,
          opacity: parseFloat(style.opacity),
        },
      };
    });
  },
  async inlineStyle({ handle, properties }) {
    return el(handle).evaluate((e, props) => {
      const out = {};
      for (const p of props) out[p] = e.style.getPropertyValue(p);
      return out;
    }, properties);
  },
  async setInlineStyle({ handle, style }) {
    await el(handle).evaluate((e, values) => {
      for (const [p, v] of Object.entries(values)) {
        if (v === '') e.style.removeProperty(p);
        else e.style.setProperty(p, v);
      }
    }, style);
    return null;
  },
  async images({ handle }) {
    return el(handle).evaluate((e) =>
      Array.from(e.querySelectorAll('img')).map((img, index) => ({
        index,
        src: img.getAttribute('src') || '',
        dataSrc: img.getAttribute('data-src'),
        lazy: img.getAttribute('loading') === 'lazy',
        complete: img.complete,
        naturalWidth: img.naturalWidth,
        naturalHeight: img.naturalHeight,
      })));
  },
  async activateLazyImage({ handle, index, src }) {
    await el(handle).evaluate((e, args) => {
      const img = e.querySelectorAll('img')[args.index];
      if (!img) return;
      if (args.src && !img.getAttribute('src')) img.setAttribute('src', args.src);
      img.removeAttribute('data-src');
      img.removeAttribute('loading');
    }, { index, src });
    return null;
  },
  async waitForImage({ handle, index }) {
    return el(handle).evaluate((e, i) => new Promise((resolve) => {
      const img = e.querySelectorAll('img')[i];
      if (!img || (img.complete && img.naturalWidth > 0)) return resolve('loaded');
      if (img.complete) return resolve('failed');
      img.addEventListener('load', () => resolve('loaded'), { once: true });
      img.addEventListener('error', () => resolve('failed'), { once: true });
    }), index);
  },
  async rasterize({ handle }) {
    const png = await el(handle).screenshot({ type: 'png', animations: 'disabled' });
    return { data: png.toString('base64') };
  },
  async navigate({ path }) {
    handles.clear();
    const target = new URL(path, url).href;
    await page.goto(target, { waitUntil: 'load', timeout: parseInt(navTimeout, 10) });
    return null;
  },
  async currentPath() {
    return new URL(page.url()).pathname;
  },
  async close() {
    setImmediate(async () => {
      if (browser) await browser.close();
      process.exit(0);
    });
    return null;
  },
};

async function start() {
  const { chromium } = require('playwright');
  browser = await chromium.launch({ headless: headlessFlag !== '0' });
  const context = await browser.newContext({
    viewport: { width: parseInt(width, 10), height: parseInt(height, 10) },
    deviceScaleFactor: parseFloat(scale) || 1,
  });
  page = await context.newPage();

  if (proxyUrl) {
    const origin = new URL(url).origin;
    await page.route('**/*', (route) => {
      const req = route.request();
      const target = req.url();
      if (req.resourceType() === 'image' && !target.startsWith(proxyUrl)
          && target.startsWith('http') && new URL(target).origin !== origin) {
        return route.continue({ url: proxyUrl + encodeURIComponent(target) });
      }
      return route.continue();
    });
  }

  await page.goto(url, { waitUntil: 'load', timeout: parseInt(navTimeout, 10) });
}

async function main() {
  try {
    await start();
    reply(0, true, null);
  } catch (err) {
    reply(0, false, err && err.message ? err.message : String(err));
    if (browser) await browser.close();
    process.exit(1);
  }

  const rl = readline.createInterface({ input: process.stdin });
  rl.on('line', async (line) => {
    let req;
    try {
      req = JSON.parse(line);
    } catch (err) {
      return;
    }
    const op = ops[req.op];
    if (!op) return reply(req.id, false, `unknown op ${req.op}`);
    try {
      reply(req.id, true, await op(req));
    } catch (err) {
      reply(req.id, false, err && err.message ? err.message : String(err));
    }
  });
  rl.on('close', async () => {
    if (browser) await browser.close();
    process.exit(0);
  });
}

main();
"#;

/// Timeout for checking node/playwright availability.
pub(crate) const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const PLAYWRIGHT_CHECK_SCRIPT: &str = "require('playwright'); process.stdout.write('ok');";

const MISSING_PLAYWRIGHT: &str =
    "Playwright npm package is missing; install with `npm install playwright`.";

pub(crate) fn map_spawn_error(err: io::Error, command: &str) -> DexError {
    if err.kind() == io::ErrorKind::NotFound {
        DexError::Config(format!(
            "Unable to spawn Playwright helper; '{}' was not found on PATH",
            command
        ))
    } else {
        DexError::Io(err)
    }
}

fn mentions_missing_module(text: &str) -> bool {
    text.to_ascii_lowercase()
        .contains("cannot find module 'playwright'")
}

/// Maps an error reported by the helper for one request.
pub(crate) fn map_helper_error(op: &str, message: &str) -> DexError {
    if mentions_missing_module(message) {
        return DexError::Config(MISSING_PLAYWRIGHT.to_string());
    }
    if message.to_ascii_lowercase().contains("timeout") {
        return DexError::host(format!(
            "Playwright {op} timed out: {message}. Hint: raise [browser] navigation_timeout or --capture-timeout."
        ));
    }
    DexError::host(format!("Playwright {op} failed: {message}"))
}

/// Maps an unexpected helper exit, using whatever it wrote to stderr.
pub(crate) fn map_helper_exit(stderr: &str) -> DexError {
    if mentions_missing_module(stderr) {
        return DexError::Config(MISSING_PLAYWRIGHT.to_string());
    }
    let tail = stderr.trim();
    if tail.is_empty() {
        DexError::host("Playwright helper exited unexpectedly")
    } else {
        DexError::host(format!("Playwright helper exited unexpectedly: {tail}"))
    }
}

pub(crate) async fn ensure_node_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let status = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.status())
        .await
        .map_err(|_| {
            DexError::Config(format!(
                "Timed out checking node availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !status.success() {
        return Err(DexError::Config(format!(
            "Node command {:?} is not available (exit {})",
            node_command, status
        )));
    }

    Ok(())
}

pub(crate) async fn ensure_playwright_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(PLAYWRIGHT_CHECK_SCRIPT)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            DexError::Config(format!(
                "Timed out checking Playwright availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !output.status.success() {
        return Err(map_helper_exit(&String::from_utf8_lossy(&output.stderr)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_module_maps_to_install_hint() {
        let err = map_helper_exit("Error: Cannot find module 'playwright'\n    at Module._resolveFilename");
        match err {
            DexError::Config(msg) => assert!(msg.contains("npm install playwright"), "{msg}"),
            other => panic!("expected config error, got {other:?}"),
        }

        let err = map_helper_error("launch", "Cannot find module 'playwright'");
        assert!(matches!(err, DexError::Config(_)));
    }

    #[test]
    fn timeouts_carry_a_hint() {
        let err = map_helper_error("navigate", "page.goto: Timeout 30000ms exceeded");
        let msg = err.to_string();
        assert!(msg.contains("navigate timed out"), "{msg}");
        assert!(msg.contains("navigation_timeout"), "{msg}");
    }

    #[test]
    fn other_errors_keep_the_message() {
        let msg = map_helper_error("describe", "unknown element handle 7").to_string();
        assert!(msg.contains("describe failed"));
        assert!(msg.contains("unknown element handle 7"));
        assert!(map_helper_exit("").to_string().contains("exited unexpectedly"));
    }

    #[test]
    fn spawn_not_found_is_a_config_error() {
        let err = map_spawn_error(io::Error::from(io::ErrorKind::NotFound), "nodez");
        assert!(matches!(err, DexError::Config(msg) if msg.contains("'nodez'")));
    }

    #[tokio::test]
    async fn ensure_node_available_fails_for_missing_binary() {
        let result = ensure_node_available("definitely-not-a-binary").await;
        assert!(matches!(result, Err(DexError::Config(_))));
    }

    #[tokio::test]
    async fn ensure_playwright_available_fails_for_missing_binary() {
        let result = ensure_playwright_available("definitely-not-a-binary").await;
        assert!(result.is_err());
    }
}
