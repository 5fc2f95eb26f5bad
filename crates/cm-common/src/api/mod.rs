pub mod recommendation_query;
pub mod recommendation_response;
pub mod search_request;

pub use recommendation_query::RecommendationQuery;
pub use recommendation_response::RecommendationResponse;
pub use search_request::SearchRequest;
