use serde::{Deserialize, Serialize};

/// Appended by the recommendation service to every search phrase.
pub const HUMOR_QUALIFIER: &str = "웃긴 영상";
pub const MAX_RECOMMENDATIONS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoItem {
    pub title: String,
    pub channel: String,
    pub video_url: String,
    pub thumbnail: String,
}

/// Raw body returned by the recommendation service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationResponse {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub videos: Vec<VideoItem>,
}

/// What presentation shows: the keywords used and up to five videos.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recommendation {
    pub query: String,
    pub videos: Vec<VideoItem>,
}

impl Recommendation {
    pub fn from_response(tags: &[String], response: RecommendationResponse) -> Self {
        let mut videos = response.videos;
        videos.truncate(MAX_RECOMMENDATIONS);
        Self {
            query: display_query(tags),
            videos,
        }
    }
}

pub fn display_query(tags: &[String]) -> String {
    tags.join(" ")
}

pub fn search_phrase(tags: &[String]) -> String {
    format!("{} {}", display_query(tags), HUMOR_QUALIFIER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(n: usize) -> VideoItem {
        VideoItem {
            title: format!("video {n}"),
            channel: "ch".into(),
            video_url: format!("https://www.youtube.com/watch?v={n}"),
            thumbnail: format!("https://i.ytimg.com/{n}.jpg"),
        }
    }

    #[test]
    fn test_query_joins_tags_and_qualifier() {
        let tags = vec!["반전".to_string(), "병맛".to_string()];
        assert_eq!(display_query(&tags), "반전 병맛");
        assert_eq!(search_phrase(&tags), "반전 병맛 웃긴 영상");
    }

    #[test]
    fn test_recommendation_keeps_at_most_five_videos() {
        let tags = vec!["a".to_string()];
        let response = RecommendationResponse {
            query: "a 웃긴 영상".into(),
            videos: (0..7).map(video).collect(),
        };
        let rec = Recommendation::from_response(&tags, response);
        assert_eq!(rec.videos.len(), MAX_RECOMMENDATIONS);
        assert_eq!(rec.videos[0], video(0));
        assert_eq!(rec.query, "a");
    }
}
