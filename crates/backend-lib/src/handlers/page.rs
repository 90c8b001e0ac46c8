// crates/backend-lib/src/handlers/page.rs

//! Minimal status page. The user id is read from the URL by the page
//! itself, so nothing user-supplied is rendered server-side.
use axum::response::Html;

const STATUS_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Glasses stream status</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 2rem; max-width: 40rem; }
  dt { font-weight: 600; }
  dd { margin: 0 0 .5rem 0; font-family: monospace; }
  .error { color: #b00020; }
</style>
</head>
<body>
<h1>Glasses stream status</h1>
<form id="pick" hidden>
  <label>User id <input name="user" required></label>
  <button>Watch</button>
</form>
<p id="conn">connecting&hellip;</p>
<dl id="fields"></dl>
<script>
  const parts = location.pathname.split('/');
  const user = parts[1] === 'status' ? decodeURIComponent(parts[2] || '') : '';
  const pick = document.getElementById('pick');
  const conn = document.getElementById('conn');
  const fields = document.getElementById('fields');
  if (!user) {
    pick.hidden = false;
    conn.textContent = '';
    pick.addEventListener('submit', (e) => {
      e.preventDefault();
      location.href = '/status/' + encodeURIComponent(pick.user.value);
    });
  } else {
    const source = new EventSource('/api/status/' + encodeURIComponent(user) + '/events');
    source.onopen = () => { conn.textContent = 'live: ' + user; };
    source.onerror = () => { conn.textContent = 'reconnecting...'; };
    source.addEventListener('status', (e) => {
      const status = JSON.parse(e.data);
      fields.replaceChildren();
      if (!status.hasSession) {
        fields.textContent = 'No active session';
        return;
      }
      for (const [key, value] of Object.entries(status)) {
        const dt = document.createElement('dt');
        const dd = document.createElement('dd');
        dt.textContent = key;
        dd.textContent = value === null ? '-' : String(value);
        if (key === 'errorDetail' && value) dd.className = 'error';
        fields.append(dt, dd);
      }
    });
  }
</script>
</body>
</html>
"#;

/// `GET /` and `GET /status/{user_id}`
pub async fn status_page() -> Html<&'static str> {
    Html(STATUS_PAGE)
}
