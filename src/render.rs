//! Minimal HTML for the storefront pages. Pages receive plain data and
//! produce markup; no behavior lives here.

use std::fmt::Write as _;

use crate::catalog::{Page, ProductDetail};
use crate::flash::{Flash, Level};
use crate::models::{Category, Product};
use crate::routes::{SHOP_PREFIX, USERS_PREFIX};

pub struct Chrome<'a> {
    pub categories: &'a [Category],
    pub flash: Option<&'a Flash>,
    pub signed_in: bool,
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn layout(title: &str, chrome: &Chrome<'_>, body: &str) -> String {
    let mut nav = String::new();
    for category in chrome.categories {
        let _ = write!(
            nav,
            r#"<li><a href="{SHOP_PREFIX}/category/{}/">{}</a></li>"#,
            escape(&category.slug),
            escape(&category.title)
        );
    }

    let account = if chrome.signed_in {
        format!(r#"<form method="post" action="{USERS_PREFIX}/logout/"><button>Log out</button></form>"#)
    } else {
        format!(
            r#"<a href="{USERS_PREFIX}/login/">Log in</a> <a href="{USERS_PREFIX}/register/">Register</a>"#
        )
    };

    let flash = chrome
        .flash
        .map(|f| {
            let class = match f.level {
                Level::Success => "success",
                Level::Error => "error",
            };
            format!(r#"<p class="flash {class}">{}</p>"#, escape(&f.message))
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>{title}</title></head>
<body>
<header><a href="{SHOP_PREFIX}/">Honey Kitchen</a> {account}
<form method="get" action="{SHOP_PREFIX}/"><input name="q" placeholder="Search"></form>
<ul class="categories">{nav}</ul></header>
{flash}
<main>{body}</main>
</body></html>"#,
        title = escape(title),
    )
}

fn product_card(product: &Product) -> String {
    format!(
        r#"<article class="product"><a href="{SHOP_PREFIX}/detail/{id}/"><img src="{image}" alt=""><h3>{name}</h3></a><p class="price">{price}</p></article>"#,
        id = product.id,
        image = escape(&product.image),
        name = escape(&product.name),
        price = product.price,
    )
}

pub fn listing(
    title: &str,
    chrome: &Chrome<'_>,
    page: &Page<Product>,
    base_path: &str,
    query: Option<&str>,
) -> String {
    let mut body = String::new();
    for product in &page.items {
        body.push_str(&product_card(product));
    }
    if page.items.is_empty() {
        body.push_str("<p>No products found.</p>");
    }

    let extra = query
        .filter(|q| !q.is_empty())
        .map(|q| format!("&q={}", escape(q)))
        .unwrap_or_default();
    body.push_str(r#"<nav class="pagination">"#);
    if page.has_previous() {
        let _ = write!(
            body,
            r#"<a href="{base_path}?page={}{extra}">Previous</a> "#,
            page.number - 1
        );
    }
    let _ = write!(body, "Page {} of {}", page.number, page.num_pages);
    if page.has_next() {
        let _ = write!(
            body,
            r#" <a href="{base_path}?page={}{extra}">Next</a>"#,
            page.number + 1
        );
    }
    body.push_str("</nav>");

    layout(title, chrome, &body)
}

pub fn all_products(chrome: &Chrome<'_>, products: &[Product]) -> String {
    let body: String = products.iter().map(product_card).collect();
    layout("All products", chrome, &body)
}

pub fn detail(chrome: &Chrome<'_>, detail: &ProductDetail) -> String {
    let product = &detail.product;
    let mut body = format!(
        r#"<h1>{name}</h1><img src="{image}" alt=""><p class="price">{price}</p><p>{description}</p><p>In stock: {amount}</p><p>Rating: {rating:.1} / 5</p><p>Likes: {likes}</p>"#,
        name = escape(&product.name),
        image = escape(&product.image),
        price = product.price,
        description = escape(product.description.as_deref().unwrap_or("")),
        amount = product.amount,
        rating = detail.average_rating,
        likes = detail.like_count,
    );

    for image in &detail.images {
        let _ = write!(body, r#"<img class="gallery" src="{}" alt="">"#, escape(&image.image));
    }

    let _ = write!(
        body,
        r#"<form method="post" action="{SHOP_PREFIX}/add-to-cart/{id}/"><input name="quantity" type="number" min="1" value="1"><button>Add to cart</button></form>
<form method="post" action="{SHOP_PREFIX}/toggle-like/{id}/"><button>Like</button></form>
<h2>Reviews</h2>"#,
        id = product.id
    );
    for comment in &detail.comments {
        let _ = write!(
            body,
            r#"<blockquote><p>{stars}</p><p>{content}</p><footer>{name}</footer></blockquote>"#,
            stars = stars(comment.rating),
            content = escape(&comment.content),
            name = escape(&comment.name),
        );
    }

    let _ = write!(
        body,
        r#"<form method="post" action="{SHOP_PREFIX}/comment_add/{id}/">
<input name="name" placeholder="Name"><input name="email" type="email" placeholder="Email">
<textarea name="content"></textarea>
<select name="rating">{options}</select><button>Post review</button></form>"#,
        id = product.id,
        options = (1..=5)
            .map(|r| format!(r#"<option value="{r}">{}</option>"#, stars(r)))
            .collect::<String>(),
    );

    layout(&product.name, chrome, &body)
}

fn stars(rating: i32) -> String {
    let filled = rating.clamp(0, 5) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

pub fn login_form(chrome: &Chrome<'_>, next: Option<&str>) -> String {
    let next = next
        .map(|n| format!(r#"<input type="hidden" name="next" value="{}">"#, escape(n)))
        .unwrap_or_default();
    let body = format!(
        r#"<h1>Log in</h1><form method="post" action="{USERS_PREFIX}/login/">{next}
<input name="email" type="email" placeholder="Email"><input name="password" type="password" placeholder="Password">
<button>Log in</button></form>"#
    );
    layout("Log in", chrome, &body)
}

pub fn register_form(chrome: &Chrome<'_>) -> String {
    let body = format!(
        r#"<h1>Register</h1><form method="post" action="{USERS_PREFIX}/register/">
<input name="name" placeholder="Name"><input name="email" type="email" placeholder="Email">
<input name="password" type="password" placeholder="Password"><button>Create account</button></form>"#
    );
    layout("Register", chrome, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_is_escaped() {
        assert_eq!(
            escape(r#"<b>"Bees" & 'wax'</b>"#),
            "&lt;b&gt;&quot;Bees&quot; &amp; &#39;wax&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn stars_match_rating() {
        assert_eq!(stars(3), "★★★☆☆");
        assert_eq!(stars(5), "★★★★★");
    }

    #[test]
    fn pagination_links_keep_the_search() {
        let page = Page {
            items: Vec::new(),
            number: 2,
            num_pages: 3,
            count: 25,
        };
        let chrome = Chrome {
            categories: &[],
            flash: None,
            signed_in: false,
        };
        let html = listing("Shop", &chrome, &page, "/honeykitchen/", Some("comb"));
        assert!(html.contains(r#"href="/honeykitchen/?page=1&q=comb""#));
        assert!(html.contains(r#"href="/honeykitchen/?page=3&q=comb""#));
        assert!(html.contains("Page 2 of 3"));
    }
}
