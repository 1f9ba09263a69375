//! dashboard pages. static html, the data comes from the json/png endpoints.

const STYLE: &str = r#"
    body { font-family: system-ui; padding: 2rem; background: #1a1a2e; color: #eee; }
    a, button { color: #eee; }
    button { background: #16213e; border: 1px solid #0f3460; border-radius: 8px; padding: .6rem 1rem; margin: .25rem; cursor: pointer; }
    .device { display: inline-flex; align-items: center; gap: .5rem; margin-right: 2rem; }
    .indicator { width: 12px; height: 12px; border-radius: 50%; background: #666; }
    .indicator.online { background: #4ecca3; }
    .indicator.offline { background: #ff6b6b; }
    table { border-collapse: collapse; margin-top: 1rem; }
    td, th { padding: .3rem .8rem; border-bottom: 1px solid #0f3460; text-align: left; }
"#;

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>{title}</title><style>{STYLE}</style></head>
<body>
{body}
</body>
</html>"#
    )
}

/// `/` - device status + navigation
pub fn index(devices: &[&str]) -> String {
    let mut status = String::new();
    for device in devices {
        status.push_str(&format!(
            r#"<div class="device" id="{device}_status"><span class="indicator"></span>{device}: <span id="{device}_status_text">Offline</span></div>"#
        ));
    }

    let body = format!(
        r#"<h1>Sensor Hub</h1>
<section>{status}</section>
<nav>
  <button onclick="location.href='/plot_aht21'">Temperature plot</button>
  <button onclick="location.href='/plot_mq6'">Gas plot</button>
  <button onclick="location.href='/aht21'">Temperature data</button>
  <button onclick="location.href='/mq6'">MQ6 data</button>
  <button onclick="location.href='/overall'">Overall plot</button>
</nav>
<script>
function updateStatus() {{
  fetch('/esp32_status')
    .then(r => r.json())
    .then(data => {{
      for (const [device, status] of Object.entries(data)) {{
        const el = document.getElementById(`${{device}}_status`);
        if (!el) continue;
        const online = status === 'online';
        document.getElementById(`${{device}}_status_text`).textContent = online ? 'Online' : 'Offline';
        const dot = el.querySelector('.indicator');
        dot.classList.toggle('online', online);
        dot.classList.toggle('offline', !online);
      }}
    }})
    .catch(err => console.error('Error fetching status:', err));
}}
setInterval(updateStatus, 5000);
updateStatus();
</script>"#
    );
    layout("Sensor Hub", &body)
}

fn table_page(title: &str, sources: &[(&str, &str)]) -> String {
    let mut sections = String::new();
    let mut loaders = String::new();
    for (i, (heading, url)) in sources.iter().enumerate() {
        sections.push_str(&format!(
            r#"<h2>{heading}</h2><table><thead><tr><th>Timestamp</th><th>Value</th></tr></thead><tbody id="rows{i}"></tbody></table>"#
        ));
        loaders.push_str(&format!("load('{url}', 'rows{i}');\n"));
    }

    let body = format!(
        r#"<h1>{title}</h1>
<p><a href="/">back</a></p>
{sections}
<script>
function load(url, target) {{
  fetch(url)
    .then(r => r.json())
    .then(rows => {{
      const tbody = document.getElementById(target);
      tbody.innerHTML = '';
      for (const [ts, value] of rows) {{
        const tr = document.createElement('tr');
        tr.innerHTML = `<td>${{new Date(ts).toLocaleString()}}</td><td>${{value}}</td>`;
        tbody.appendChild(tr);
      }}
    }});
}}
{loaders}</script>"#
    );
    layout(title, &body)
}

/// `/aht21` - temperature and humidity listings
pub fn aht21() -> String {
    table_page(
        "AHT21",
        &[
            ("Temperature (°C)", "/aht21_temperature_data"),
            ("Humidity (%)", "/aht21_humidity_data"),
        ],
    )
}

/// `/mq6` - gas readings listing
pub fn mq6() -> String {
    table_page("MQ6", &[("MQ6 Reading", "/mq6_data")])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_lists_each_device_and_polls_status() {
        let html = index(&["esp32_1", "esp32_2"]);
        assert!(html.contains(r#"id="esp32_1_status""#));
        assert!(html.contains(r#"id="esp32_2_status_text""#));
        assert!(html.contains("fetch('/esp32_status')"));
    }

    #[test]
    fn data_pages_load_their_endpoints() {
        assert!(aht21().contains("load('/aht21_humidity_data', 'rows1');"));
        assert!(mq6().contains("load('/mq6_data', 'rows0');"));
    }
}
