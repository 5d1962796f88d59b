mod user_urls;
