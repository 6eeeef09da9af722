mod handler_image_uploaded;
mod vertex_clients;
